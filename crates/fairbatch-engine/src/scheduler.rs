//! Time-driven batch scheduler.
//!
//! A tokio task that ticks the shared engine on a fixed interval: apply every
//! due transition, then open the next batch whenever none is accepting flow.
//! Stops when the shutdown channel flips to `true` or its sender is dropped.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::shared::SharedEngine;

/// Drives [`SharedEngine::tick`] from the wall clock.
#[derive(Debug, Clone)]
pub struct Scheduler {
    engine: SharedEngine,
    period: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(engine: SharedEngine, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Spawn the tick loop.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(period_ms = self.period.as_millis(), "scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (reached, opened) = self.engine.tick(Utc::now());
                        for (batch, phase) in reached {
                            tracing::debug!(batch = batch.0, %phase, "scheduler advanced batch");
                        }
                        if let Some(batch) = opened {
                            tracing::debug!(batch = batch.0, "scheduler opened batch");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use fairbatch_types::constants::DEFAULT_TICK_MS;
    use fairbatch_types::{BatchId, BatchPhase, ProtocolConfig};

    use super::*;
    use crate::lifecycle::{Collaborators, Controller};

    fn engine(window_ms: u64) -> SharedEngine {
        let config = ProtocolConfig {
            commit_window: Duration::from_millis(window_ms),
            reveal_window: Duration::from_millis(window_ms),
            ..ProtocolConfig::default()
        };
        SharedEngine::new(Controller::new(config, Collaborators::standalone()).unwrap())
    }

    #[tokio::test]
    async fn runs_batches_until_shutdown() {
        let engine = engine(30);
        let (tx, rx) = watch::channel(false);
        let handle = Scheduler::new(engine.clone(), Duration::from_millis(5)).spawn(rx);

        tokio::time::sleep(Duration::from_millis(400)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let ctl = engine.lock();
        assert!(!ctl.audit_log().is_empty(), "no batch closed");
        assert_eq!(ctl.phase(BatchId(1)).unwrap(), BatchPhase::Closed);
        ctl.verify_supply().unwrap();
    }

    #[tokio::test]
    async fn dropped_sender_stops_loop() {
        let (tx, rx) = watch::channel(false);
        let handle = Scheduler::new(engine(1_000), Duration::from_millis(DEFAULT_TICK_MS)).spawn(rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}

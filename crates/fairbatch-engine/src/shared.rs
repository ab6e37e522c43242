//! Thread-safe handle to the controller.
//!
//! Every call takes the lock for its whole duration, so participant
//! operations are serialized against each other and against phase
//! transitions. Nobody observes a half-applied settlement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fairbatch_ingress::{CommitRequest, RevealRequest};
use fairbatch_types::{
    AssetAmount, BalanceEntry, BatchId, BatchPhase, CommitmentId, Order, ParticipantId, Result,
};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;

use crate::lifecycle::Controller;

/// Cloneable, lock-protected controller.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Controller>>,
}

impl SharedEngine {
    #[must_use]
    pub fn new(controller: Controller) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    /// Hold the lock across several calls.
    pub fn lock(&self) -> MutexGuard<'_, Controller> {
        self.inner.lock()
    }

    /// Run `f` under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Controller) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn deposit(&self, participant: ParticipantId, asset: &str, amount: Decimal) -> Result<()> {
        self.inner.lock().deposit(participant, asset, amount)
    }

    pub fn withdraw(&self, participant: ParticipantId, asset: &str, amount: Decimal) -> Result<()> {
        self.inner.lock().withdraw(participant, asset, amount)
    }

    pub fn commit(
        &self,
        batch_id: BatchId,
        request: CommitRequest,
        now: DateTime<Utc>,
    ) -> Result<CommitmentId> {
        self.inner.lock().commit(batch_id, request, now)
    }

    pub fn reveal(&self, batch_id: BatchId, request: RevealRequest, now: DateTime<Utc>) -> Result<Order> {
        self.inner.lock().reveal(batch_id, request, now)
    }

    pub fn claim(&self, batch_id: BatchId, participant: ParticipantId) -> Result<Vec<AssetAmount>> {
        self.inner.lock().claim(batch_id, participant)
    }

    /// Apply due transitions, then open a batch if none is accepting flow.
    ///
    /// Returns the phases reached and the id of a newly opened batch.
    pub fn tick(&self, now: DateTime<Utc>) -> (Vec<(BatchId, BatchPhase)>, Option<BatchId>) {
        let mut ctl = self.inner.lock();
        let reached = ctl.advance(now);
        let opened = if ctl.open_batch_id().is_none() {
            ctl.open_batch(now)
                .inspect_err(|err| tracing::warn!(error = %err, "could not open batch"))
                .ok()
        } else {
            None
        };
        (reached, opened)
    }

    #[must_use]
    pub fn balance(&self, participant: ParticipantId, asset: &str) -> BalanceEntry {
        self.inner.lock().balance(participant, asset)
    }

    #[must_use]
    pub fn open_batch_id(&self) -> Option<BatchId> {
        self.inner.lock().open_batch_id()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use fairbatch_types::ProtocolConfig;

    use super::*;
    use crate::lifecycle::Collaborators;

    fn engine() -> SharedEngine {
        let config = ProtocolConfig {
            commit_window: Duration::from_secs(10),
            reveal_window: Duration::from_secs(10),
            ..ProtocolConfig::default()
        };
        SharedEngine::new(Controller::new(config, Collaborators::standalone()).unwrap())
    }

    #[test]
    fn concurrent_deposits_are_serialized() {
        let engine = engine();
        let alice = ParticipantId::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        engine.deposit(alice, "USDC", Decimal::ONE).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(engine.balance(alice, "USDC").available, Decimal::new(800, 0));
        engine.with(|ctl| ctl.verify_supply()).unwrap();
    }

    #[test]
    fn tick_opens_and_rolls_batches() {
        let engine = engine();
        let t0 = Utc::now();

        let (reached, opened) = engine.tick(t0);
        assert!(reached.is_empty());
        assert_eq!(opened, Some(BatchId(1)));

        // Still committing: nothing new.
        assert_eq!(engine.tick(t0 + chrono::Duration::seconds(5)).1, None);

        // Batch 1 enters REVEAL; batch 2 must wait.
        let (reached, opened) = engine.tick(t0 + chrono::Duration::seconds(11));
        assert_eq!(reached, vec![(BatchId(1), BatchPhase::Reveal)]);
        assert_eq!(opened, None);

        // Batch 1 closes and batch 2 opens in the same tick.
        let (reached, opened) = engine.tick(t0 + chrono::Duration::seconds(21));
        assert_eq!(reached, vec![(BatchId(1), BatchPhase::Closed)]);
        assert_eq!(opened, Some(BatchId(2)));
    }
}

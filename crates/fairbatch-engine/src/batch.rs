//! One batch's working state.
//!
//! A [`Batch`] owns its commitment store, revealed orders and entropy, and
//! caches the output of every settlement stage so a failed `close_batch`
//! can be retried by `finalize` without recomputing (or re-applying)
//! anything that already succeeded.

use chrono::{DateTime, Utc};
use fairbatch_ingress::{CommitmentStore, EntropyAggregator};
use fairbatch_settlement::RoutingStatus;
use fairbatch_types::{
    BatchId, BatchPhase, BatchSchedule, BatchSummary, ClearingResult, ContributionInput,
    FairbatchError, Order, Result, RevealStatus, RewardAllocation, Seed, SettlementReport,
};

/// Cached outputs of the settlement stages, filled in order.
#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    pub seed: Option<Seed>,
    /// Revealed orders in execution order.
    pub sequence: Option<Vec<Order>>,
    pub clearing: Option<ClearingResult>,
    pub settlement: Option<SettlementReport>,
    pub rewards: Option<RewardAllocation>,
    pub routing: Option<RoutingStatus>,
}

impl StageOutputs {
    /// Name of the first stage without output, `None` once proceeds are
    /// routed. Treasury deliveries may still be queued at that point.
    #[must_use]
    pub fn pending_stage(&self) -> Option<&'static str> {
        if self.seed.is_none() {
            Some("seed")
        } else if self.sequence.is_none() {
            Some("sequence")
        } else if self.clearing.is_none() {
            Some("clearing")
        } else if self.settlement.is_none() {
            Some("settlement")
        } else if self.rewards.is_none() {
            Some("rewards")
        } else if self.routing.is_none() {
            Some("routing")
        } else {
            None
        }
    }
}

/// A batch and everything it has produced so far.
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    phase: BatchPhase,
    pub(crate) store: CommitmentStore,
    pub(crate) entropy: EntropyAggregator,
    pub(crate) orders: Vec<Order>,
    pub(crate) contributions: Vec<ContributionInput>,
    pub(crate) stages: StageOutputs,
}

impl Batch {
    #[must_use]
    pub fn new(id: BatchId, schedule: BatchSchedule, capacity: usize) -> Self {
        Self {
            id,
            phase: BatchPhase::Commit,
            store: CommitmentStore::new(id, schedule, capacity),
            entropy: EntropyAggregator::new(),
            orders: Vec::new(),
            contributions: Vec::new(),
            stages: StageOutputs::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    #[must_use]
    pub fn schedule(&self) -> &BatchSchedule {
        self.store.schedule()
    }

    #[must_use]
    pub fn commitments(&self) -> &CommitmentStore {
        &self.store
    }

    /// Revealed orders in reveal order.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    #[must_use]
    pub fn contributions(&self) -> &[ContributionInput] {
        &self.contributions
    }

    #[must_use]
    pub fn stages(&self) -> &StageOutputs {
        &self.stages
    }

    /// Step to the next phase.
    ///
    /// # Errors
    /// `PhaseViolation` unless `to` directly follows the current phase.
    pub(crate) fn transition(&mut self, to: BatchPhase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(FairbatchError::PhaseViolation {
                batch: self.id,
                expected: to,
                actual: self.phase,
            });
        }
        tracing::info!(batch = self.id.0, from = %self.phase, to = %to, "batch phase transition");
        self.phase = to;
        Ok(())
    }

    /// Fail with `PhaseViolation` unless the batch is in `expected`.
    pub(crate) fn require(&self, expected: BatchPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(FairbatchError::PhaseViolation {
                batch: self.id,
                expected,
                actual: self.phase,
            })
        }
    }

    /// Headline facts for the archive. Needs the seed and clearing stages.
    pub(crate) fn summary(&self, closed_at: DateTime<Utc>) -> Result<BatchSummary> {
        let (Some(seed), Some(clearing)) = (self.stages.seed, self.stages.clearing.as_ref()) else {
            return Err(FairbatchError::Internal(format!(
                "summary of {} requested before clearing",
                self.id
            )));
        };
        let schedule = self.schedule();
        Ok(BatchSummary {
            batch_id: self.id,
            opened_at: schedule.opened_at,
            commit_deadline: schedule.commit_deadline,
            reveal_deadline: schedule.reveal_deadline,
            closed_at,
            commitments: self.store.len(),
            revealed: self.store.count_with(RevealStatus::Revealed),
            slashed: self.store.count_with(RevealStatus::Slashed),
            seed,
            fill_root: clearing.fill_root,
        })
    }
}

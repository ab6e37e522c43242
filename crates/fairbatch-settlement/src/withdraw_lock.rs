//! Withdraw lock.
//!
//! Blocks withdrawals while any batch is `Settling`: balances are in flux
//! between the reveal barrier and archival, and an outflow in that window
//! could strand a settlement transfer. Commit and Reveal phases do not lock.

use std::collections::BTreeSet;

use fairbatch_types::{BatchId, BatchPhase, FairbatchError, Result};

/// Tracks which batches currently hold the lock.
#[derive(Debug, Clone, Default)]
pub struct WithdrawLock {
    settling: BTreeSet<BatchId>,
}

impl WithdrawLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow a batch's phase change.
    pub fn on_phase(&mut self, batch: BatchId, phase: BatchPhase) {
        if phase == BatchPhase::Settling {
            self.settling.insert(batch);
        } else {
            self.settling.remove(&batch);
        }
    }

    #[must_use]
    pub fn withdrawals_allowed(&self) -> bool {
        self.settling.is_empty()
    }

    /// Oldest batch holding the lock.
    #[must_use]
    pub fn holder(&self) -> Option<BatchId> {
        self.settling.first().copied()
    }

    /// # Errors
    /// [`FairbatchError::WithdrawLocked`] naming the oldest settling batch.
    pub fn check_withdraw(&self) -> Result<()> {
        match self.holder() {
            None => Ok(()),
            Some(batch) => Err(FairbatchError::WithdrawLocked(batch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_phases_allow_withdraw() {
        let mut lock = WithdrawLock::new();
        lock.on_phase(BatchId(1), BatchPhase::Commit);
        assert!(lock.check_withdraw().is_ok());
        lock.on_phase(BatchId(1), BatchPhase::Reveal);
        assert!(lock.withdrawals_allowed());
    }

    #[test]
    fn settling_blocks_until_closed() {
        let mut lock = WithdrawLock::new();
        lock.on_phase(BatchId(1), BatchPhase::Settling);
        let err = lock.check_withdraw().unwrap_err();
        assert!(matches!(err, FairbatchError::WithdrawLocked(BatchId(1))));

        lock.on_phase(BatchId(1), BatchPhase::Closed);
        assert!(lock.check_withdraw().is_ok());
    }

    #[test]
    fn overlapping_batches() {
        let mut lock = WithdrawLock::new();
        lock.on_phase(BatchId(2), BatchPhase::Settling);
        lock.on_phase(BatchId(3), BatchPhase::Settling);
        assert_eq!(lock.holder(), Some(BatchId(2)));

        lock.on_phase(BatchId(2), BatchPhase::Closed);
        assert_eq!(lock.holder(), Some(BatchId(3)));
        assert!(!lock.withdrawals_allowed());

        lock.on_phase(BatchId(3), BatchPhase::Closed);
        assert!(lock.withdrawals_allowed());
    }
}

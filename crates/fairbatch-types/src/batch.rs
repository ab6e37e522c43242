//! Batch lifecycle types.
//!
//! Each batch moves through four phases, never skipping and never going back:
//! **COMMIT → REVEAL → SETTLING → CLOSED**
//!
//! During COMMIT, participants post sealed digests and collateral.
//! During REVEAL, they disclose order fields and secrets.
//! During SETTLING, non-reveals are slashed, the seed is finalized, orders are
//! sequenced and cleared, fills settle, rewards are allocated and proceeds routed.
//! CLOSED batches are archived and immutable.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BatchId, Digest, Seed};

/// The phases of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum BatchPhase {
    /// Accepting sealed commitments.
    Commit,
    /// Accepting reveals for existing commitments.
    Reveal,
    /// Running the settlement stages.
    Settling,
    /// Archived.
    Closed,
}

labels!(BatchPhase {
    Commit => "COMMIT",
    Reveal => "REVEAL",
    Settling => "SETTLING",
    Closed => "CLOSED",
});

impl BatchPhase {
    /// The phase that follows this one, or `None` once closed.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Commit => Some(Self::Reveal),
            Self::Reveal => Some(Self::Settling),
            Self::Settling => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Whether participants can still interact with the batch.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Commit | Self::Reveal)
    }
}

/// Deadlines of a batch, fixed when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSchedule {
    pub opened_at: DateTime<Utc>,
    /// Last instant at which a commitment is accepted.
    pub commit_deadline: DateTime<Utc>,
    /// Last instant at which a reveal is accepted.
    pub reveal_deadline: DateTime<Utc>,
}

impl BatchSchedule {
    /// Schedule for a batch opened at `now`.
    ///
    /// # Errors
    /// `Configuration` if a window does not fit a `chrono::Duration`.
    pub fn starting_at(
        now: DateTime<Utc>,
        commit_window: Duration,
        reveal_window: Duration,
    ) -> crate::Result<Self> {
        let to_chrono = |d: Duration| {
            chrono::Duration::from_std(d)
                .map_err(|e| crate::FairbatchError::Configuration(format!("window {d:?}: {e}")))
        };
        let commit_deadline = now + to_chrono(commit_window)?;
        let reveal_deadline = commit_deadline + to_chrono(reveal_window)?;
        Ok(Self {
            opened_at: now,
            commit_deadline,
            reveal_deadline,
        })
    }

    /// The phase the clock alone implies at `now`, ignoring settlement.
    #[must_use]
    pub fn phase_at(&self, now: DateTime<Utc>) -> BatchPhase {
        if now <= self.commit_deadline {
            BatchPhase::Commit
        } else if now <= self.reveal_deadline {
            BatchPhase::Reveal
        } else {
            BatchPhase::Settling
        }
    }
}

/// Headline facts about a closed batch, kept in its archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub opened_at: DateTime<Utc>,
    pub commit_deadline: DateTime<Utc>,
    pub reveal_deadline: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub commitments: usize,
    pub revealed: usize,
    pub slashed: usize,
    pub seed: Seed,
    pub fill_root: Digest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_sequence_is_linear() {
        assert_eq!(BatchPhase::Commit.next(), Some(BatchPhase::Reveal));
        assert_eq!(BatchPhase::Reveal.next(), Some(BatchPhase::Settling));
        assert_eq!(BatchPhase::Settling.next(), Some(BatchPhase::Closed));
        assert_eq!(BatchPhase::Closed.next(), None);
    }

    #[test]
    fn phase_ordering_is_monotonic() {
        assert!(BatchPhase::Commit < BatchPhase::Reveal);
        assert!(BatchPhase::Settling < BatchPhase::Closed);
    }

    #[test]
    fn phase_display() {
        assert_eq!(format!("{}", BatchPhase::Commit), "COMMIT");
        assert_eq!(format!("{}", BatchPhase::Settling), "SETTLING");
    }

    #[test]
    fn schedule_deadlines_and_clock_phase() {
        let t0 = Utc::now();
        let s = BatchSchedule::starting_at(t0, Duration::from_secs(8), Duration::from_secs(2))
            .unwrap();
        assert_eq!(s.commit_deadline - t0, chrono::Duration::seconds(8));
        assert_eq!(s.reveal_deadline - t0, chrono::Duration::seconds(10));
        assert_eq!(s.phase_at(t0), BatchPhase::Commit);
        assert_eq!(s.phase_at(s.commit_deadline), BatchPhase::Commit);
        assert_eq!(
            s.phase_at(t0 + chrono::Duration::seconds(9)),
            BatchPhase::Reveal
        );
        assert_eq!(
            s.phase_at(t0 + chrono::Duration::seconds(11)),
            BatchPhase::Settling
        );
    }

    #[test]
    fn open_phases() {
        assert!(BatchPhase::Commit.is_open());
        assert!(BatchPhase::Reveal.is_open());
        assert!(!BatchPhase::Settling.is_open());
        assert!(!BatchPhase::Closed.is_open());
    }
}

//! Commitment store for one batch.
//!
//! Holds every sealed commitment in arrival order together with the
//! collateral it froze. The store never looks inside a digest; it only
//! enforces uniqueness per participant and per digest.
//!
//! ## Commit checks (in order)
//!
//! 1. Batch in COMMIT and `now <= commit_deadline` → else `PhaseViolation`
//! 2. Capacity → else `BatchFull`
//! 3. One commitment per participant → else `DuplicateCommitment`
//! 4. Digest unused this batch → else `DigestCollision` (first arrival wins)
//! 5. Access gate → `InsufficientCollateral` / `AccessDenied`
//! 6. Freeze collateral from custody → `InsufficientBalance`
//!
//! A rejected commit changes nothing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fairbatch_types::{
    Account, AssetAmount, BatchId, BatchPhase, BatchSchedule, Commitment, CommitmentId, Digest,
    FairbatchError, ParticipantId, Result, RevealStatus, SlashEvent,
};
use rust_decimal::Decimal;

use crate::access_gate::AccessGate;
use crate::ledger::EscrowLedger;

/// A participant's request to enter the batch.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub participant: ParticipantId,
    pub digest: Digest,
    pub collateral: AssetAmount,
}

/// Sealed commitments of a single batch.
#[derive(Debug, Clone)]
pub struct CommitmentStore {
    batch_id: BatchId,
    schedule: BatchSchedule,
    capacity: usize,
    /// Arrival order; the index is the arrival sequence.
    commitments: Vec<Commitment>,
    by_id: HashMap<CommitmentId, usize>,
    by_participant: HashMap<ParticipantId, usize>,
    by_digest: HashMap<Digest, usize>,
    slashes: Vec<SlashEvent>,
}

impl CommitmentStore {
    #[must_use]
    pub fn new(batch_id: BatchId, schedule: BatchSchedule, capacity: usize) -> Self {
        Self {
            batch_id,
            schedule,
            capacity,
            commitments: Vec::new(),
            by_id: HashMap::new(),
            by_participant: HashMap::new(),
            by_digest: HashMap::new(),
            slashes: Vec::new(),
        }
    }

    /// Accept a sealed commitment and freeze its collateral.
    pub fn commit(
        &mut self,
        ledger: &mut EscrowLedger,
        gate: &AccessGate,
        phase: BatchPhase,
        request: CommitRequest,
        now: DateTime<Utc>,
    ) -> Result<CommitmentId> {
        if phase != BatchPhase::Commit || now > self.schedule.commit_deadline {
            return Err(FairbatchError::PhaseViolation {
                batch: self.batch_id,
                expected: BatchPhase::Commit,
                actual: if phase == BatchPhase::Commit {
                    self.schedule.phase_at(now)
                } else {
                    phase
                },
            });
        }
        if self.commitments.len() >= self.capacity {
            return Err(FairbatchError::BatchFull(self.batch_id));
        }
        if self.by_participant.contains_key(&request.participant) {
            return Err(FairbatchError::DuplicateCommitment {
                batch: self.batch_id,
                participant: request.participant,
            });
        }
        if self.by_digest.contains_key(&request.digest) {
            return Err(FairbatchError::DigestCollision {
                batch: self.batch_id,
                digest: request.digest,
            });
        }
        gate.validate_commit(request.participant, &request.collateral)?;
        ledger.freeze(
            &Account::Participant(request.participant),
            &request.collateral.asset,
            request.collateral.amount,
        )?;

        let arrival_seq = self.commitments.len() as u64;
        let id = CommitmentId::derive(self.batch_id, arrival_seq);
        let idx = self.commitments.len();
        self.by_id.insert(id, idx);
        self.by_participant.insert(request.participant, idx);
        self.by_digest.insert(request.digest, idx);

        tracing::debug!(
            batch = self.batch_id.0,
            participant = %request.participant,
            commitment = %id,
            digest = %request.digest.short(),
            collateral = %request.collateral,
            "commitment accepted"
        );

        self.commitments.push(Commitment {
            id,
            batch_id: self.batch_id,
            participant: request.participant,
            digest: request.digest,
            collateral: request.collateral,
            arrival_seq,
            committed_at: now,
            status: RevealStatus::Pending,
            priority_bid: None,
        });
        Ok(id)
    }

    /// Move a pending commitment to its final status.
    ///
    /// # Errors
    /// - `CommitmentNotFound` for an unknown id
    /// - `CommitmentResolved` if it is no longer pending
    pub(crate) fn resolve(
        &mut self,
        id: CommitmentId,
        status: RevealStatus,
        priority_bid: Option<Decimal>,
    ) -> Result<()> {
        let commitment = self.get_mut(id)?;
        if !commitment.is_pending() {
            return Err(FairbatchError::CommitmentResolved(id));
        }
        commitment.status = status;
        commitment.priority_bid = priority_bid;
        Ok(())
    }

    pub(crate) fn record_slash(&mut self, event: SlashEvent) {
        self.slashes.push(event);
    }

    fn get_mut(&mut self, id: CommitmentId) -> Result<&mut Commitment> {
        let idx = *self
            .by_id
            .get(&id)
            .ok_or(FairbatchError::CommitmentNotFound(id))?;
        Ok(&mut self.commitments[idx])
    }

    /// Look up a commitment.
    ///
    /// # Errors
    /// `CommitmentNotFound` for an unknown id.
    pub fn get(&self, id: CommitmentId) -> Result<&Commitment> {
        self.by_id
            .get(&id)
            .map(|&idx| &self.commitments[idx])
            .ok_or(FairbatchError::CommitmentNotFound(id))
    }

    /// The participant's commitment in this batch, if any.
    #[must_use]
    pub fn by_participant(&self, participant: ParticipantId) -> Option<&Commitment> {
        self.by_participant
            .get(&participant)
            .map(|&idx| &self.commitments[idx])
    }

    /// All commitments, in arrival order.
    #[must_use]
    pub fn commitments(&self) -> &[Commitment] {
        &self.commitments
    }

    /// Commitments still awaiting a reveal, in arrival order.
    pub fn pending(&self) -> impl Iterator<Item = &Commitment> {
        self.commitments.iter().filter(|c| c.is_pending())
    }

    /// Slash events recorded for this batch, in the order they happened.
    #[must_use]
    pub fn slashes(&self) -> &[SlashEvent] {
        &self.slashes
    }

    #[must_use]
    pub fn count_with(&self, status: RevealStatus) -> usize {
        self.commitments.iter().filter(|c| c.status == status).count()
    }

    /// Sum of posted collateral per asset.
    #[must_use]
    pub fn total_collateral(&self, asset: &str) -> Decimal {
        self.commitments
            .iter()
            .filter(|c| c.collateral.asset == asset)
            .map(|c| c.collateral.amount)
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    #[must_use]
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    #[must_use]
    pub fn schedule(&self) -> &BatchSchedule {
        &self.schedule
    }
}

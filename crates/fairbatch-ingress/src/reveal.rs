//! Reveal validation and slashing.
//!
//! A reveal opens exactly one pending commitment:
//!
//! 1. Batch in REVEAL and `now <= reveal_deadline` → else `PhaseViolation`
//! 2. Commitment exists, belongs to the revealer and is still `Pending` →
//!    else `CommitmentNotFound` / `CommitmentResolved` (nothing changes)
//! 3. Digest recomputes, order is well formed, collateral covers it → else
//!    the commitment is slashed on the spot and `InvalidReveal` is returned
//! 4. Priority bid within access limit and funded from custody → else
//!    `AccessDenied` / `InsufficientBalance` with no state change
//! 5. Commitment → `Revealed`, secret → entropy, [`Order`] created
//!
//! Slashing splits collateral into `slashed = trunc(c × rate)` and
//! `refund = c − slashed`. The slashed part is divided across treasury,
//! insurance, burn and bounty by bps; the last destination with a non-zero
//! weight takes the truncation residue. All movements apply atomically.

use chrono::{DateTime, Utc};
use fairbatch_types::amount::bps_of;
use fairbatch_types::config::SlashSplitBps;
use fairbatch_types::{
    compute_digest, Account, BatchPhase, CommitmentId, FairbatchError, Order, OrderFields,
    ParticipantId, ProtocolConfig, Result, RevealStatus, Secret, SlashEvent, SlashReason, SlashSplit, Transfer,
};
use rust_decimal::Decimal;

use crate::access_gate::AccessGate;
use crate::commitment_store::CommitmentStore;
use crate::entropy::EntropyAggregator;
use crate::ledger::EscrowLedger;

/// What a participant discloses during REVEAL.
#[derive(Debug, Clone)]
pub struct RevealRequest {
    pub participant: ParticipantId,
    pub commitment_id: CommitmentId,
    pub fields: OrderFields,
    pub secret: Secret,
}

/// Validates reveals against commitments and applies slashes.
#[derive(Debug, Clone)]
pub struct RevealValidator {
    gate: AccessGate,
    slash_rate_bps: u32,
    split: SlashSplitBps,
}

impl RevealValidator {
    #[must_use]
    pub fn new(gate: AccessGate, config: &ProtocolConfig) -> Self {
        Self {
            gate,
            slash_rate_bps: config.slash_rate_bps,
            split: config.slash_split.clone(),
        }
    }

    /// Open a commitment.
    pub fn reveal(
        &self,
        store: &mut CommitmentStore,
        entropy: &mut EntropyAggregator,
        ledger: &mut EscrowLedger,
        phase: BatchPhase,
        request: RevealRequest,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let batch_id = store.batch_id();
        let deadline = store.schedule().reveal_deadline;
        if phase != BatchPhase::Reveal || now > deadline {
            return Err(FairbatchError::PhaseViolation {
                batch: batch_id,
                expected: BatchPhase::Reveal,
                actual: if phase == BatchPhase::Reveal {
                    BatchPhase::Settling
                } else {
                    phase
                },
            });
        }

        let commitment = store.get(request.commitment_id)?.clone();
        if commitment.participant != request.participant {
            tracing::warn!(
                batch = batch_id.0,
                participant = %request.participant,
                commitment = %commitment.id,
                "reveal for another participant's commitment"
            );
            return Err(FairbatchError::CommitmentNotFound(commitment.id));
        }
        if !commitment.is_pending() {
            return Err(FairbatchError::CommitmentResolved(commitment.id));
        }

        let invalid = if let Some(reason) = request.fields.malformed_reason() {
            Some(reason.to_string())
        } else if compute_digest(&request.fields, &request.secret, &commitment.collateral)
            != commitment.digest
        {
            Some("digest mismatch".to_string())
        } else if !commitment.covers(&request.fields) {
            Some(format!(
                "collateral {} does not cover {} {}",
                commitment.collateral,
                request.fields.max_input().unwrap_or_default(),
                request.fields.input_asset()
            ))
        } else {
            None
        };
        if let Some(reason) = invalid {
            self.slash(store, ledger, commitment.id, SlashReason::InvalidReveal)?;
            return Err(FairbatchError::InvalidReveal {
                commitment: commitment.id,
                reason,
            });
        }

        let bid = request.fields.priority_bid;
        if bid > Decimal::ZERO {
            self.gate.validate_priority_bid(commitment.participant, bid)?;
            ledger.apply_atomic(&[Transfer::pay(
                Account::Participant(commitment.participant),
                Account::Proceeds(batch_id),
                request.fields.pair.quote.clone(),
                bid,
            )])?;
        }

        store.resolve(commitment.id, RevealStatus::Revealed, Some(bid))?;
        entropy.absorb(&request.secret);

        tracing::debug!(
            batch = batch_id.0,
            participant = %commitment.participant,
            commitment = %commitment.id,
            pair = %request.fields.pair,
            direction = %request.fields.direction,
            priority = !bid.is_zero(),
            "reveal accepted"
        );

        Ok(Order {
            id: commitment.id,
            batch_id,
            participant: commitment.participant,
            fields: request.fields,
            secret: request.secret,
            arrival_seq: commitment.arrival_seq,
        })
    }

    /// Slash every commitment still pending at the reveal deadline.
    pub fn close_reveal_phase(
        &self,
        store: &mut CommitmentStore,
        ledger: &mut EscrowLedger,
    ) -> Result<Vec<SlashEvent>> {
        let pending: Vec<CommitmentId> = store.pending().map(|c| c.id).collect();
        let mut events = Vec::with_capacity(pending.len());
        for id in pending {
            events.push(self.slash(store, ledger, id, SlashReason::NonReveal)?);
        }
        Ok(events)
    }

    /// Slash one pending commitment.
    pub fn slash(
        &self,
        store: &mut CommitmentStore,
        ledger: &mut EscrowLedger,
        id: CommitmentId,
        reason: SlashReason,
    ) -> Result<SlashEvent> {
        let commitment = store.get(id)?.clone();
        if !commitment.is_pending() {
            return Err(FairbatchError::CommitmentResolved(id));
        }

        let collateral = commitment.collateral.amount;
        let slashed = bps_of(collateral, self.slash_rate_bps);
        let refund = collateral - slashed;
        let split = self.split_slashed(slashed);

        let owner = Account::Participant(commitment.participant);
        let asset = commitment.collateral.asset.clone();
        let transfers = [
            Transfer::consume(owner.clone(), Account::Treasury, asset.clone(), split.treasury),
            Transfer::consume(owner.clone(), Account::Insurance, asset.clone(), split.insurance),
            Transfer::consume(owner.clone(), Account::Burn, asset.clone(), split.burn),
            Transfer::consume(owner.clone(), Account::Bounty, asset.clone(), split.bounty),
            Transfer::unfreeze(owner, asset.clone(), refund),
        ];
        ledger.apply_atomic(&transfers)?;
        store.resolve(id, RevealStatus::Slashed, None)?;

        let event = SlashEvent {
            participant: commitment.participant,
            batch_id: commitment.batch_id,
            commitment: id,
            asset,
            collateral,
            slashed,
            refund,
            split,
            reason,
        };
        tracing::warn!(
            batch = event.batch_id.0,
            participant = %event.participant,
            commitment = %id,
            %reason,
            collateral = %event.collateral,
            slashed = %event.slashed,
            refund = %event.refund,
            "commitment slashed"
        );
        store.record_slash(event.clone());
        Ok(event)
    }

    /// Divide a slashed amount by the configured bps split.
    #[must_use]
    pub fn split_slashed(&self, slashed: Decimal) -> SlashSplit {
        let weights = [
            self.split.treasury_bps,
            self.split.insurance_bps,
            self.split.burn_bps,
            self.split.bounty_bps,
        ];
        let mut parts = weights.map(|bps| bps_of(slashed, bps));
        if let Some(last) = weights.iter().rposition(|&bps| bps > 0) {
            let others: Decimal = parts
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != last)
                .map(|(_, p)| *p)
                .sum();
            parts[last] = slashed - others;
        }
        SlashSplit {
            treasury: parts[0],
            insurance: parts[1],
            burn: parts[2],
            bounty: parts[3],
        }
    }
}

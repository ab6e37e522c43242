//! Slash records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, BatchId, CommitmentId, ParticipantId};

/// Why a commitment was slashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlashReason {
    /// The reveal did not match the digest, or the order was malformed or
    /// under-collateralized.
    InvalidReveal,
    /// No reveal arrived before the reveal deadline.
    NonReveal,
}

labels!(SlashReason {
    InvalidReveal => "INVALID_REVEAL",
    NonReveal => "NON_REVEAL",
});

/// Where the slashed amount went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashSplit {
    pub treasury: Decimal,
    pub insurance: Decimal,
    pub burn: Decimal,
    pub bounty: Decimal,
}

impl SlashSplit {
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.treasury + self.insurance + self.burn + self.bounty
    }
}

/// Record of one slashed commitment. `slashed + refund == collateral`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashEvent {
    pub participant: ParticipantId,
    pub batch_id: BatchId,
    pub commitment: CommitmentId,
    pub asset: Asset,
    pub collateral: Decimal,
    pub slashed: Decimal,
    pub refund: Decimal,
    pub split: SlashSplit,
    pub reason: SlashReason,
}

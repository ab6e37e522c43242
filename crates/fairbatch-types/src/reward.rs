//! Contribution and reward records.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, AssetAmount, BatchId, ParticipantId};

/// Market volatility tier, supplied by the volatility collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityTier {
    Low,
    Medium,
    High,
}

impl VolatilityTier {
    /// Stability-score multiplier for liquidity provided in this regime.
    #[must_use]
    pub fn weight(self) -> Decimal {
        match self {
            Self::Low => Decimal::ZERO,
            Self::Medium => Decimal::new(5, 1),
            Self::High => Decimal::ONE,
        }
    }
}

labels!(VolatilityTier {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
});

/// Externally measured contribution facts for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionInput {
    pub participant: ParticipantId,
    /// Quote value of liquidity supplied outside the batch.
    pub liquidity_provided: Decimal,
    /// Whole days the participant's liquidity has stayed in the pool.
    pub days_in_pool: u32,
}

/// A participant's scored contribution to one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub participant: ParticipantId,
    pub direct: Decimal,
    pub days_in_pool: u32,
    pub time_score: Decimal,
    pub scarcity_score: Decimal,
    pub stability_score: Decimal,
    /// Weighted sum of the normalized components.
    pub weighted_score: Decimal,
    /// `weighted_score / sum(weighted_score)`.
    pub share_fraction: Decimal,
}

/// One participant's reward in one asset. Immutable once allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardShare {
    pub batch_id: BatchId,
    pub participant: ParticipantId,
    pub asset: Asset,
    pub amount: Decimal,
}

/// Reward allocation for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAllocation {
    pub batch_id: BatchId,
    /// Emission era of the batch.
    pub era: u64,
    pub contributions: Vec<ContributionRecord>,
    pub shares: Vec<RewardShare>,
    /// Per asset amount made available to participants this batch.
    pub distributable: BTreeMap<Asset, Decimal>,
    /// Per asset amount routed to the treasury (non-emitted or undistributable).
    pub treasury: BTreeMap<Asset, Decimal>,
}

impl RewardAllocation {
    /// All shares owed to one participant, as asset amounts.
    #[must_use]
    pub fn shares_for(&self, participant: ParticipantId) -> Vec<AssetAmount> {
        self.shares
            .iter()
            .filter(|s| s.participant == participant && !s.amount.is_zero())
            .map(|s| AssetAmount::new(s.asset.clone(), s.amount))
            .collect()
    }

    /// Sum of shares in one asset.
    #[must_use]
    pub fn total_shared(&self, asset: &str) -> Decimal {
        self.shares
            .iter()
            .filter(|s| s.asset == asset)
            .map(|s| s.amount)
            .sum()
    }
}

//! Protocol configuration.
//!
//! A [`ProtocolConfig`] is built once (defaults or JSON), validated, and then
//! shared read-only by every component.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{self, BPS_DENOMINATOR};
use crate::{FairbatchError, Result};

/// Destination split of slashed collateral, in bps of the slashed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashSplitBps {
    pub treasury_bps: u32,
    pub insurance_bps: u32,
    pub burn_bps: u32,
    pub bounty_bps: u32,
}

impl SlashSplitBps {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.treasury_bps + self.insurance_bps + self.burn_bps + self.bounty_bps
    }
}

impl Default for SlashSplitBps {
    fn default() -> Self {
        Self {
            treasury_bps: constants::DEFAULT_SLASH_TREASURY_BPS,
            insurance_bps: constants::DEFAULT_SLASH_INSURANCE_BPS,
            burn_bps: constants::DEFAULT_SLASH_BURN_BPS,
            bounty_bps: constants::DEFAULT_SLASH_BOUNTY_BPS,
        }
    }
}

/// Weights of the four contribution components, in bps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub direct_bps: u32,
    pub time_bps: u32,
    pub scarcity_bps: u32,
    pub stability_bps: u32,
}

impl RewardWeights {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.direct_bps + self.time_bps + self.scarcity_bps + self.stability_bps
    }
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            direct_bps: constants::DEFAULT_DIRECT_WEIGHT_BPS,
            time_bps: constants::DEFAULT_TIME_WEIGHT_BPS,
            scarcity_bps: constants::DEFAULT_SCARCITY_WEIGHT_BPS,
            stability_bps: constants::DEFAULT_STABILITY_WEIGHT_BPS,
        }
    }
}

/// Protocol parameters for the whole engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Length of the COMMIT phase.
    pub commit_window: Duration,
    /// Length of the REVEAL phase.
    pub reveal_window: Duration,
    /// Smallest collateral accepted with a commitment.
    pub min_collateral: Decimal,
    /// Share of collateral forfeited on slash.
    pub slash_rate_bps: u32,
    pub slash_split: SlashSplitBps,
    /// Per-order ceiling as a share of reported pool liquidity.
    pub max_trade_size_bps: u32,
    /// Fee on the received side of each fill.
    pub fee_rate_bps: u32,
    pub reward_weights: RewardWeights,
    /// Multiplier applied to `log2(days + 1)`.
    pub time_score_constant: Decimal,
    /// Guaranteed per-participant reward carved out before the split.
    pub min_reward_floor: Option<Decimal>,
    /// Batches per emission era; emissions halve each era.
    pub batches_per_era: u64,
    /// Eras past this cap emit nothing.
    pub max_era: u64,
    pub max_commitments_per_batch: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            commit_window: Duration::from_millis(constants::DEFAULT_COMMIT_MS),
            reveal_window: Duration::from_millis(constants::DEFAULT_REVEAL_MS),
            min_collateral: Decimal::new(1, 2), // 0.01
            slash_rate_bps: constants::DEFAULT_SLASH_RATE_BPS,
            slash_split: SlashSplitBps::default(),
            max_trade_size_bps: constants::DEFAULT_MAX_TRADE_SIZE_BPS,
            fee_rate_bps: constants::DEFAULT_FEE_RATE_BPS,
            reward_weights: RewardWeights::default(),
            time_score_constant: Decimal::ONE,
            min_reward_floor: None,
            batches_per_era: constants::DEFAULT_BATCHES_PER_ERA,
            max_era: constants::DEFAULT_MAX_ERA,
            max_commitments_per_batch: constants::MAX_COMMITMENTS_PER_BATCH,
        }
    }
}

impl ProtocolConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| FairbatchError::Configuration(format!("invalid JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Check parameter consistency.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(FairbatchError::Configuration(msg)) };

        if self.commit_window.is_zero() || self.reveal_window.is_zero() {
            return fail("commit and reveal windows must be non-zero".into());
        }
        if self.min_collateral < Decimal::ZERO {
            return fail(format!("min_collateral {} is negative", self.min_collateral));
        }
        if self.slash_rate_bps > BPS_DENOMINATOR {
            return fail(format!("slash_rate_bps {} exceeds 10000", self.slash_rate_bps));
        }
        if self.slash_split.total() != BPS_DENOMINATOR {
            return fail(format!(
                "slash_split sums to {} bps, expected 10000",
                self.slash_split.total()
            ));
        }
        if self.max_trade_size_bps == 0 || self.max_trade_size_bps > BPS_DENOMINATOR {
            return fail(format!(
                "max_trade_size_bps {} outside 1..=10000",
                self.max_trade_size_bps
            ));
        }
        if self.fee_rate_bps >= BPS_DENOMINATOR {
            return fail(format!("fee_rate_bps {} must be below 10000", self.fee_rate_bps));
        }
        if self.reward_weights.total() != BPS_DENOMINATOR {
            return fail(format!(
                "reward_weights sum to {} bps, expected 10000",
                self.reward_weights.total()
            ));
        }
        if self.time_score_constant <= Decimal::ZERO {
            return fail("time_score_constant must be positive".into());
        }
        if self.min_reward_floor.is_some_and(|f| f < Decimal::ZERO) {
            return fail("min_reward_floor must not be negative".into());
        }
        if self.batches_per_era == 0 {
            return fail("batches_per_era must be positive".into());
        }
        if self.max_commitments_per_batch == 0 {
            return fail("max_commitments_per_batch must be positive".into());
        }
        Ok(())
    }
}

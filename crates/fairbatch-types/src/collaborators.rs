//! Trait boundaries to external collaborators.
//!
//! The engine never prices against a curve, scores identities or holds
//! treasury funds itself. Each of those concerns is injected as an
//! `Arc<dyn Trait>` and called at a fixed point of the batch lifecycle:
//!
//! ```text
//!   commit ──► AccessPolicy::trade_limit
//!   clear  ──► PricingProvider::liquidity / quote
//!   settle ──► PricingProvider::apply_trade        (after the atomic commit)
//!   reward ──► VolatilityClassifier::volatility_tier
//!   route  ──► Treasury::deposit                   (retried, idempotent)
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, AssetAmount, Direction, ParticipantId, Result, TradingPair, VolatilityTier};

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// External liquidity source (an AMM or similar).
pub trait PricingProvider: Send + Sync {
    /// Price at which the pool would absorb `amount` base units of flow in
    /// `direction` (a buy takes base out of the pool). `None` if it cannot.
    fn quote(&self, pair: &TradingPair, direction: Direction, amount: Decimal) -> Option<Decimal>;

    /// Pool depth used for the per-order trade-size ceiling.
    fn liquidity(&self, pair: &TradingPair) -> Option<Decimal>;

    /// Notification that batch flow executed against the pool.
    fn apply_trade(
        &self,
        pair: &TradingPair,
        direction: Direction,
        amount: Decimal,
        price: Decimal,
    ) -> Result<()>;
}

/// No external pool: batch flow must cross on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPool;

impl PricingProvider for NoPool {
    fn quote(&self, _: &TradingPair, _: Direction, _: Decimal) -> Option<Decimal> {
        None
    }

    fn liquidity(&self, _: &TradingPair) -> Option<Decimal> {
        None
    }

    fn apply_trade(&self, _: &TradingPair, _: Direction, _: Decimal, _: Decimal) -> Result<()> {
        Ok(())
    }
}

/// A trade applied to a [`StaticPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTrade {
    pub pair: TradingPair,
    pub direction: Direction,
    pub amount: Decimal,
    pub price: Decimal,
}

/// A pool that quotes one fixed price and reports fixed depth for every pair.
#[derive(Debug)]
pub struct StaticPool {
    price: Decimal,
    liquidity: Decimal,
    applied: Mutex<Vec<PoolTrade>>,
}

impl StaticPool {
    #[must_use]
    pub fn new(price: Decimal, liquidity: Decimal) -> Self {
        Self {
            price,
            liquidity,
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Trades applied so far.
    #[must_use]
    pub fn applied(&self) -> Vec<PoolTrade> {
        self.applied.lock().clone()
    }
}

impl PricingProvider for StaticPool {
    fn quote(&self, _: &TradingPair, _: Direction, amount: Decimal) -> Option<Decimal> {
        (amount > Decimal::ZERO && amount <= self.liquidity).then_some(self.price)
    }

    fn liquidity(&self, _: &TradingPair) -> Option<Decimal> {
        Some(self.liquidity)
    }

    fn apply_trade(
        &self,
        pair: &TradingPair,
        direction: Direction,
        amount: Decimal,
        price: Decimal,
    ) -> Result<()> {
        self.applied.lock().push(PoolTrade {
            pair: pair.clone(),
            direction,
            amount,
            price,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

/// Opaque access tier assigned by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccessTier(pub u8);

/// Features gated by access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Posting a commitment to a batch auction.
    BatchAuction,
    /// Paying for execution priority.
    PriorityBid,
}

pub trait AccessPolicy: Send + Sync {
    fn tier(&self, participant: ParticipantId) -> AccessTier;

    /// Largest collateral (or bid) the participant may place for `feature`.
    fn trade_limit(&self, participant: ParticipantId, feature: Feature) -> Decimal;
}

/// Everyone allowed, no limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn tier(&self, _: ParticipantId) -> AccessTier {
        AccessTier(0)
    }

    fn trade_limit(&self, _: ParticipantId, _: Feature) -> Decimal {
        Decimal::MAX
    }
}

/// Per-participant limits with a default for unknown participants.
#[derive(Debug, Clone, Default)]
pub struct StaticLimits {
    default_limit: Decimal,
    limits: HashMap<ParticipantId, (AccessTier, Decimal)>,
}

impl StaticLimits {
    #[must_use]
    pub fn new(default_limit: Decimal) -> Self {
        Self {
            default_limit,
            limits: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, participant: ParticipantId, tier: AccessTier, limit: Decimal) -> Self {
        self.limits.insert(participant, (tier, limit));
        self
    }
}

impl AccessPolicy for StaticLimits {
    fn tier(&self, participant: ParticipantId) -> AccessTier {
        self.limits
            .get(&participant)
            .map_or(AccessTier(0), |(tier, _)| *tier)
    }

    fn trade_limit(&self, participant: ParticipantId, _: Feature) -> Decimal {
        self.limits
            .get(&participant)
            .map_or(self.default_limit, |(_, limit)| *limit)
    }
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

/// Downstream treasury receiving protocol amounts.
pub trait Treasury: Send + Sync {
    /// Deposit `amount` of `asset`. A repeated `idempotency_key` is a no-op.
    fn deposit(
        &self,
        asset: &Asset,
        amount: Decimal,
        source_tag: &str,
        idempotency_key: &str,
    ) -> Result<()>;
}

/// Treasury that records deposits in memory.
#[derive(Debug, Default)]
pub struct InMemoryTreasury {
    deposits: Mutex<BTreeMap<String, (String, AssetAmount)>>,
}

impl InMemoryTreasury {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of deposits for one asset.
    #[must_use]
    pub fn total(&self, asset: &str) -> Decimal {
        self.deposits
            .lock()
            .values()
            .filter(|(_, a)| a.asset == asset)
            .map(|(_, a)| a.amount)
            .sum()
    }

    #[must_use]
    pub fn deposit_count(&self) -> usize {
        self.deposits.lock().len()
    }
}

impl Treasury for InMemoryTreasury {
    fn deposit(
        &self,
        asset: &Asset,
        amount: Decimal,
        source_tag: &str,
        idempotency_key: &str,
    ) -> Result<()> {
        self.deposits
            .lock()
            .entry(idempotency_key.to_string())
            .or_insert_with(|| (source_tag.to_string(), AssetAmount::new(asset.clone(), amount)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Volatility
// ---------------------------------------------------------------------------

pub trait VolatilityClassifier: Send + Sync {
    fn volatility_tier(&self, pair: &TradingPair, at: DateTime<Utc>) -> VolatilityTier;
}

/// Classifier that reports the same tier for every pair.
#[derive(Debug, Clone, Copy)]
pub struct FixedVolatility(pub VolatilityTier);

impl Default for FixedVolatility {
    fn default() -> Self {
        Self(VolatilityTier::Medium)
    }
}

impl VolatilityClassifier for FixedVolatility {
    fn volatility_tier(&self, _: &TradingPair, _: DateTime<Utc>) -> VolatilityTier {
        self.0
    }
}

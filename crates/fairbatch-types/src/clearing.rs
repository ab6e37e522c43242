//! Clearing output produced by the match core.
//!
//! A [`Fill`] is the immutable record of one order executing (fully or in
//! part) at its pair's uniform clearing price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, CommitmentId, Digest, Direction, ParticipantId, TradingPair};

/// Who took the other side of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counterparty {
    /// Matched against opposite flow in the same batch.
    Batch,
    /// Filled against the external liquidity pool.
    Pool,
}

labels!(Counterparty {
    Batch => "BATCH",
    Pool => "POOL",
});

/// One order's execution at the clearing price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: CommitmentId,
    pub participant: ParticipantId,
    pub pair: TradingPair,
    pub direction: Direction,
    /// Executed amount in base units.
    pub amount: Decimal,
    /// Uniform clearing price of the pair.
    pub price: Decimal,
    pub counterparty: Counterparty,
}

impl Fill {
    /// Quote value of the fill (amount × price).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }
}

impl std::fmt::Display for Fill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fill[{}] {} {} {} @ {} ({})",
            self.order_id, self.pair, self.direction, self.amount, self.price, self.counterparty
        )
    }
}

/// Clearing outcome of a single pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairClearing {
    pub pair: TradingPair,
    pub clearing_price: Decimal,
    /// Executed base volume on each side.
    pub matched_volume: Decimal,
    /// Fills in execution-sequence order.
    pub fills: Vec<Fill>,
    /// Orders that received no fill at all.
    pub unmatched: Vec<CommitmentId>,
}

/// A pair that could not clear. All of its orders are returned in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFailure {
    pub pair: TradingPair,
    pub reason: String,
    pub returned: Vec<CommitmentId>,
}

/// Clearing output of a whole batch. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearingResult {
    pub batch_id: BatchId,
    /// Pairs in canonical order.
    pub pairs: Vec<PairClearing>,
    pub failures: Vec<PairFailure>,
    /// SHA-256 root over every fill, in order.
    pub fill_root: Digest,
}

impl ClearingResult {
    /// All fills across pairs, in canonical pair order.
    pub fn fills(&self) -> impl Iterator<Item = &Fill> {
        self.pairs.iter().flat_map(|p| p.fills.iter())
    }

    /// The fill for one order, if it executed.
    #[must_use]
    pub fn fill_for(&self, order_id: CommitmentId) -> Option<&Fill> {
        self.fills().find(|f| f.order_id == order_id)
    }

    #[must_use]
    pub fn pair(&self, pair: &TradingPair) -> Option<&PairClearing> {
        self.pairs.iter().find(|p| &p.pair == pair)
    }
}

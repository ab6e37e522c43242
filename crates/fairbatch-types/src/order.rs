//! Order types for the FairBatch auction.
//!
//! A participant seals [`OrderFields`] inside a commitment digest during
//! COMMIT and discloses them during REVEAL. Only a successful reveal creates
//! an [`Order`], which is never mutated afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, BatchId, CommitmentId, ParticipantId, Secret, TradingPair};

/// Which way the order trades the base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
        }
    }
}

labels!(Direction {
    Buy => "BUY",
    Sell => "SELL",
});

// ---------------------------------------------------------------------------
// OrderFields: what the participant seals
// ---------------------------------------------------------------------------

/// The order content hidden inside a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFields {
    pub pair: TradingPair,
    pub direction: Direction,
    /// Amount in base units.
    pub amount: Decimal,
    /// Quote per base. Maximum for a buy, minimum for a sell.
    pub limit_price: Decimal,
    /// Quote units paid for execution priority. Zero for none.
    pub priority_bid: Decimal,
}

impl OrderFields {
    #[must_use]
    pub fn new(
        pair: TradingPair,
        direction: Direction,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            pair,
            direction,
            amount,
            limit_price,
            priority_bid: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn with_priority_bid(mut self, bid: Decimal) -> Self {
        self.priority_bid = bid;
        self
    }

    /// Asset the participant gives up (and posts as collateral).
    #[must_use]
    pub fn input_asset(&self) -> &Asset {
        match self.direction {
            Direction::Buy => &self.pair.quote,
            Direction::Sell => &self.pair.base,
        }
    }

    /// Asset the participant receives on a fill.
    #[must_use]
    pub fn output_asset(&self) -> &Asset {
        match self.direction {
            Direction::Buy => &self.pair.base,
            Direction::Sell => &self.pair.quote,
        }
    }

    /// Largest amount of the input asset a full fill can consume, `None`
    /// if the notional overflows.
    #[must_use]
    pub fn max_input(&self) -> Option<Decimal> {
        match self.direction {
            Direction::Buy => self.amount.checked_mul(self.limit_price),
            Direction::Sell => Some(self.amount),
        }
    }

    /// Reason the fields cannot form a valid order, if any.
    #[must_use]
    pub fn malformed_reason(&self) -> Option<&'static str> {
        if self.amount <= Decimal::ZERO {
            Some("amount must be positive")
        } else if self.limit_price <= Decimal::ZERO {
            Some("limit price must be positive")
        } else if self.priority_bid < Decimal::ZERO {
            Some("priority bid must not be negative")
        } else if self.pair.base == self.pair.quote {
            Some("pair assets must differ")
        } else if self.max_input().is_none() {
            Some("notional overflows")
        } else {
            None
        }
    }

    /// Length-prefixed canonical encoding hashed into the commitment digest.
    ///
    /// Decimals are normalized first so `1.50` and `1.5` encode identically.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        push_field(&mut buf, self.pair.base.as_bytes());
        push_field(&mut buf, self.pair.quote.as_bytes());
        buf.push(self.direction.tag());
        push_field(&mut buf, self.amount.normalize().to_string().as_bytes());
        push_field(&mut buf, self.limit_price.normalize().to_string().as_bytes());
        push_field(&mut buf, self.priority_bid.normalize().to_string().as_bytes());
        buf
    }
}

pub(crate) fn push_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

// ---------------------------------------------------------------------------
// Order: post-reveal
// ---------------------------------------------------------------------------

/// A revealed order. Its id is the id of the commitment it opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: CommitmentId,
    pub batch_id: BatchId,
    pub participant: ParticipantId,
    pub fields: OrderFields,
    pub secret: Secret,
    /// Arrival sequence of the underlying commitment.
    pub arrival_seq: u64,
}

impl Order {
    #[must_use]
    pub fn pair(&self) -> &TradingPair {
        &self.fields.pair
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.fields.direction
    }

    #[must_use]
    pub fn has_priority(&self) -> bool {
        self.fields.priority_bid > Decimal::ZERO
    }

    /// Whether this order's limit allows execution at `price`.
    #[must_use]
    pub fn accepts(&self, price: Decimal) -> bool {
        match self.fields.direction {
            Direction::Buy => self.fields.limit_price >= price,
            Direction::Sell => self.fields.limit_price <= price,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(direction: Direction, limit: Decimal, amount: Decimal) -> Self {
        Self::dummy_for(ParticipantId::new(), direction, limit, amount, 0)
    }

    pub fn dummy_for(
        participant: ParticipantId,
        direction: Direction,
        limit: Decimal,
        amount: Decimal,
        arrival_seq: u64,
    ) -> Self {
        let batch_id = BatchId(1);
        Self {
            id: CommitmentId::derive(batch_id, arrival_seq),
            batch_id,
            participant,
            fields: OrderFields::new(TradingPair::new("ETH", "USDC"), direction, amount, limit),
            secret: Secret([0u8; 32]),
            arrival_seq,
        }
    }
}

//! Balance and ledger-movement types for the FairBatch escrow model.
//!
//! Every ledger account holds, per asset, an `available` balance (escrow
//! custody, withdrawable) and a `frozen` balance (locked by an open batch).
//! Value moves between accounts only through balanced [`Transfer`]s, so the
//! total supply of an asset changes only on deposit and withdrawal.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, ParticipantId, TradingPair};

/// A single balance entry for an (account, asset) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Escrow custody: usable for new commitments or withdrawal.
    pub available: Decimal,
    /// Locked by an open batch (collateral or priority bids).
    pub frozen: Decimal,
}

impl BalanceEntry {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
        }
    }

    /// Total balance (available + frozen).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.frozen.is_zero()
    }

    /// Mutable handle on one bucket.
    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Decimal {
        match bucket {
            Bucket::Available => &mut self.available,
            Bucket::Frozen => &mut self.frozen,
        }
    }
}

impl Default for BalanceEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// Type alias for asset identifiers (e.g., "ETH", "USDC").
pub type Asset = String;

/// An amount of a specific asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetAmount {
    pub asset: Asset,
    pub amount: Decimal,
}

impl AssetAmount {
    #[must_use]
    pub fn new(asset: impl Into<Asset>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
        }
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.asset)
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A ledger account key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Account {
    /// A participant's escrow custody.
    Participant(ParticipantId),
    /// Protocol treasury (slash share, non-emitted rewards).
    Treasury,
    /// Insurance pool (slash share).
    Insurance,
    /// Burned value, held so that supply stays auditable.
    Burn,
    /// Bounty pool (slash share).
    Bounty,
    /// External liquidity pool for a pair.
    Pool(TradingPair),
    /// Fees and priority payments collected by a batch, pending rewards.
    Proceeds(BatchId),
    /// Clearing house for one batch's crossing fills. Nets to zero once
    /// settlement commits.
    Clearing(BatchId),
}

impl Account {
    #[must_use]
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            Self::Participant(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Participant(id) => write!(f, "participant:{id}"),
            Self::Treasury => write!(f, "TREASURY"),
            Self::Insurance => write!(f, "INSURANCE"),
            Self::Burn => write!(f, "BURN"),
            Self::Bounty => write!(f, "BOUNTY"),
            Self::Pool(pair) => write!(f, "pool:{pair}"),
            Self::Proceeds(batch) => write!(f, "proceeds:{batch}"),
            Self::Clearing(batch) => write!(f, "clearing:{batch}"),
        }
    }
}

/// Which half of a [`BalanceEntry`] a transfer touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Available,
    Frozen,
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// A balanced movement of one asset between two ledger buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub asset: Asset,
    pub amount: Decimal,
    pub from: Account,
    pub from_bucket: Bucket,
    pub to: Account,
    pub to_bucket: Bucket,
}

impl Transfer {
    /// Move available funds into the same account's frozen bucket.
    #[must_use]
    pub fn freeze(account: Account, asset: impl Into<Asset>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
            from: account.clone(),
            from_bucket: Bucket::Available,
            to: account,
            to_bucket: Bucket::Frozen,
        }
    }

    /// Return frozen funds to the same account's available bucket.
    #[must_use]
    pub fn unfreeze(account: Account, asset: impl Into<Asset>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
            from: account.clone(),
            from_bucket: Bucket::Frozen,
            to: account,
            to_bucket: Bucket::Available,
        }
    }

    /// Consume frozen funds of `from` and credit them to `to`'s available bucket.
    #[must_use]
    pub fn consume(from: Account, to: Account, asset: impl Into<Asset>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
            from,
            from_bucket: Bucket::Frozen,
            to,
            to_bucket: Bucket::Available,
        }
    }

    /// Pay available funds of `from` into `to`'s available bucket.
    #[must_use]
    pub fn pay(from: Account, to: Account, asset: impl Into<Asset>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
            from,
            from_bucket: Bucket::Available,
            to,
            to_bucket: Bucket::Available,
        }
    }

    /// Pay available funds of `from` into `to`'s frozen bucket.
    #[must_use]
    pub fn escrow(from: Account, to: Account, asset: impl Into<Asset>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
            from,
            from_bucket: Bucket::Available,
            to,
            to_bucket: Bucket::Frozen,
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{:?} -> {}:{:?}",
            self.amount, self.asset, self.from, self.from_bucket, self.to, self.to_bucket
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_entry_default_is_zero() {
        let entry = BalanceEntry::default();
        assert_eq!(entry.available, Decimal::ZERO);
        assert_eq!(entry.frozen, Decimal::ZERO);
        assert!(entry.is_zero());
    }

    #[test]
    fn balance_entry_total_and_buckets() {
        let mut entry = BalanceEntry {
            available: Decimal::new(100, 0),
            frozen: Decimal::new(50, 0),
        };
        assert_eq!(entry.total(), Decimal::new(150, 0));
        *entry.bucket_mut(Bucket::Frozen) -= Decimal::new(20, 0);
        assert_eq!(entry.frozen, Decimal::new(30, 0));
    }

    #[test]
    fn transfer_constructors_pick_buckets() {
        let p = Account::Participant(ParticipantId::new());
        let t = Transfer::consume(p.clone(), Account::Treasury, "USDC", Decimal::ONE);
        assert_eq!(t.from_bucket, Bucket::Frozen);
        assert_eq!(t.to_bucket, Bucket::Available);

        let u = Transfer::unfreeze(p, "USDC", Decimal::ONE);
        assert_eq!(u.from, u.to);
        assert_eq!(u.from_bucket, Bucket::Frozen);
    }

    #[test]
    fn account_display() {
        assert_eq!(format!("{}", Account::Treasury), "TREASURY");
        assert_eq!(format!("{}", Account::Proceeds(BatchId(4))), "proceeds:batch:4");
        assert_eq!(
            format!("{}", Account::Pool(TradingPair::new("ETH", "USDC"))),
            "pool:ETH/USDC"
        );
    }
}

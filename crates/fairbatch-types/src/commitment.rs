//! Sealed commitments and the commitment digest.
//!
//! ```text
//!   digest = SHA-256( "fairbatch:commit:v1:"
//!                  || canonical(order fields)
//!                  || secret
//!                  || len || collateral asset
//!                  || len || collateral amount )
//! ```
//!
//! The store never inspects a digest beyond equality; clients compute it
//! with [`compute_digest`] before committing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::order::push_field;
use crate::{AssetAmount, BatchId, CommitmentId, Digest, OrderFields, ParticipantId, Secret};

/// Domain separator for commitment digests.
pub const COMMIT_DOMAIN: &[u8] = b"fairbatch:commit:v1:";

/// Compute the digest a participant commits to.
#[must_use]
pub fn compute_digest(fields: &OrderFields, secret: &Secret, collateral: &AssetAmount) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(COMMIT_DOMAIN);
    hasher.update(fields.canonical_bytes());
    hasher.update(secret.as_bytes());
    let mut tail = Vec::with_capacity(48);
    push_field(&mut tail, collateral.asset.as_bytes());
    push_field(
        &mut tail,
        collateral.amount.normalize().to_string().as_bytes(),
    );
    hasher.update(&tail);
    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    Digest(digest)
}

/// Reveal status of a commitment. Changes exactly once, from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevealStatus {
    Pending,
    Revealed,
    Slashed,
}

labels!(RevealStatus {
    Pending => "PENDING",
    Revealed => "REVEALED",
    Slashed => "SLASHED",
});

/// A participant's sealed order for one batch, with its posted collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: CommitmentId,
    pub batch_id: BatchId,
    pub participant: ParticipantId,
    pub digest: Digest,
    pub collateral: AssetAmount,
    pub arrival_seq: u64,
    pub committed_at: DateTime<Utc>,
    pub status: RevealStatus,
    /// Priority bid disclosed at reveal. `None` until revealed.
    pub priority_bid: Option<Decimal>,
}

impl Commitment {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RevealStatus::Pending
    }

    /// Whether the posted collateral covers the revealed order's maximum input.
    #[must_use]
    pub fn covers(&self, fields: &OrderFields) -> bool {
        self.collateral.asset == *fields.input_asset()
            && fields
                .max_input()
                .is_some_and(|needed| self.collateral.amount >= needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, TradingPair};

    fn fields() -> OrderFields {
        OrderFields::new(
            TradingPair::new("ETH", "USDC"),
            Direction::Buy,
            Decimal::new(1, 0),
            Decimal::new(2000, 0),
        )
    }

    #[test]
    fn digest_is_deterministic_and_binding() {
        let secret = Secret([7u8; 32]);
        let collateral = AssetAmount::new("USDC", Decimal::new(2000, 0));
        let a = compute_digest(&fields(), &secret, &collateral);
        let b = compute_digest(&fields(), &secret, &collateral);
        assert_eq!(a, b);

        let other_secret = compute_digest(&fields(), &Secret([8u8; 32]), &collateral);
        assert_ne!(a, other_secret);

        let other_amount = compute_digest(
            &fields(),
            &secret,
            &AssetAmount::new("USDC", Decimal::new(2001, 0)),
        );
        assert_ne!(a, other_amount);

        let hidden_bid = compute_digest(
            &fields().with_priority_bid(Decimal::ONE),
            &secret,
            &collateral,
        );
        assert_ne!(a, hidden_bid);
    }

    #[test]
    fn covers_checks_asset_and_size() {
        let mut c = Commitment {
            id: CommitmentId::derive(BatchId(1), 0),
            batch_id: BatchId(1),
            participant: ParticipantId::new(),
            digest: Digest([0u8; 32]),
            collateral: AssetAmount::new("USDC", Decimal::new(2000, 0)),
            arrival_seq: 0,
            committed_at: Utc::now(),
            status: RevealStatus::Pending,
            priority_bid: None,
        };
        assert!(c.covers(&fields()));
        c.collateral.amount = Decimal::new(1999, 0);
        assert!(!c.covers(&fields()));
        c.collateral = AssetAmount::new("ETH", Decimal::new(5000, 0));
        assert!(!c.covers(&fields()));
    }
}

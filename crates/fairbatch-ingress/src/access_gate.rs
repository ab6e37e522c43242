//! Access gate: hard check in front of the commitment store.
//!
//! Every commitment and every priority bid passes through the gate before it
//! touches the ledger.
//!
//! - **Fail-closed**: a limit below the requested amount rejects
//! - **Opaque tiers**: the gate never interprets the tier, it only asks the
//!   policy for a limit per [`Feature`]

use std::sync::Arc;

use fairbatch_types::{AccessPolicy, AssetAmount, FairbatchError, Feature, ParticipantId, Result};
use rust_decimal::Decimal;

/// Gate validating commit-time and reveal-time amounts.
#[derive(Clone)]
pub struct AccessGate {
    policy: Arc<dyn AccessPolicy>,
    min_collateral: Decimal,
}

impl AccessGate {
    #[must_use]
    pub fn new(policy: Arc<dyn AccessPolicy>, min_collateral: Decimal) -> Self {
        Self {
            policy,
            min_collateral,
        }
    }

    /// Validate collateral posted with a commitment.
    ///
    /// # Errors
    /// - `InsufficientCollateral` below the protocol minimum
    /// - `AccessDenied` above the participant's batch-auction limit
    pub fn validate_commit(&self, participant: ParticipantId, collateral: &AssetAmount) -> Result<()> {
        if collateral.amount < self.min_collateral || collateral.amount <= Decimal::ZERO {
            return Err(FairbatchError::InsufficientCollateral {
                minimum: self.min_collateral,
                posted: collateral.amount,
            });
        }
        self.check_limit(participant, Feature::BatchAuction, collateral.amount)
    }

    /// Validate a revealed priority bid. Zero bids always pass.
    ///
    /// # Errors
    /// `AccessDenied` above the participant's priority-bid limit.
    pub fn validate_priority_bid(&self, participant: ParticipantId, bid: Decimal) -> Result<()> {
        if bid.is_zero() {
            return Ok(());
        }
        self.check_limit(participant, Feature::PriorityBid, bid)
    }

    fn check_limit(&self, participant: ParticipantId, feature: Feature, requested: Decimal) -> Result<()> {
        let limit = self.policy.trade_limit(participant, feature);
        if requested > limit {
            tracing::debug!(
                participant = %participant,
                tier = self.policy.tier(participant).0,
                ?feature,
                %requested,
                %limit,
                "access denied"
            );
            return Err(FairbatchError::AccessDenied {
                participant,
                requested,
                limit,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn min_collateral(&self) -> Decimal {
        self.min_collateral
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("min_collateral", &self.min_collateral)
            .finish_non_exhaustive()
    }
}

//! Supply conservation invariant checker.
//!
//! Enforced after every settlement stage:
//! ```text
//! ∀ asset: Σ(available + frozen over every account) == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! Slashing, fills, fees and reward claims only move value between ledger
//! accounts, so none of them may change the left-hand side. A mismatch is
//! a bug, never a participant error.

use std::collections::{BTreeMap, BTreeSet};

use fairbatch_ingress::EscrowLedger;
use fairbatch_types::{Asset, FairbatchError, Result};
use rust_decimal::Decimal;

/// Per-asset external inflow and outflow totals since genesis.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    deposits: BTreeMap<Asset, Decimal>,
    withdrawals: BTreeMap<Asset, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, asset: &str, amount: Decimal) {
        *self.deposits.entry(asset.to_string()).or_default() += amount;
    }

    pub fn record_withdrawal(&mut self, asset: &str, amount: Decimal) {
        *self.withdrawals.entry(asset.to_string()).or_default() += amount;
    }

    #[must_use]
    pub fn total_deposits(&self, asset: &str) -> Decimal {
        self.deposits.get(asset).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn total_withdrawals(&self, asset: &str) -> Decimal {
        self.withdrawals.get(asset).copied().unwrap_or_default()
    }

    /// Expected total supply: deposits - withdrawals.
    #[must_use]
    pub fn expected_supply(&self, asset: &str) -> Decimal {
        self.total_deposits(asset) - self.total_withdrawals(asset)
    }

    /// Check one asset against an observed supply.
    ///
    /// # Errors
    /// [`FairbatchError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, asset: &str, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(asset);
        if actual_supply != expected {
            tracing::error!(
                asset,
                actual = %actual_supply,
                expected = %expected,
                "supply invariant violated"
            );
            return Err(FairbatchError::SupplyInvariantViolation {
                reason: format!(
                    "asset {asset}: actual supply {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(asset),
                    self.total_withdrawals(asset),
                ),
            });
        }
        Ok(())
    }

    /// Check every asset the ledger or the tracker has seen.
    pub fn verify_ledger(&self, ledger: &EscrowLedger) -> Result<()> {
        for asset in self.tracked_assets_with(ledger) {
            self.verify(&asset, ledger.total_supply(&asset))?;
        }
        Ok(())
    }

    /// Assets with recorded external flows, sorted.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<Asset> {
        self.deposits
            .keys()
            .chain(self.withdrawals.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn tracked_assets_with(&self, ledger: &EscrowLedger) -> BTreeSet<Asset> {
        let mut assets: BTreeSet<Asset> = self.tracked_assets().into_iter().collect();
        assets.extend(ledger.assets());
        assets
    }
}

#[cfg(test)]
mod tests {
    use fairbatch_types::{Account, ParticipantId, Transfer};

    use super::*;

    #[test]
    fn empty_supply_is_zero() {
        let sc = SupplyConservation::new();
        assert_eq!(sc.expected_supply("ETH"), Decimal::ZERO);
        assert!(sc.verify("ETH", Decimal::ZERO).is_ok());
    }

    #[test]
    fn deposits_minus_withdrawals() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit("USDC", Decimal::new(1000, 0));
        sc.record_deposit("USDC", Decimal::new(500, 0));
        sc.record_withdrawal("USDC", Decimal::new(300, 0));
        assert_eq!(sc.expected_supply("USDC"), Decimal::new(1200, 0));
        assert_eq!(sc.tracked_assets(), vec!["USDC".to_string()]);
    }

    #[test]
    fn verify_fails_when_imbalanced() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit("ETH", Decimal::new(10, 0));
        let err = sc.verify("ETH", Decimal::new(11, 0)).unwrap_err();
        assert!(matches!(err, FairbatchError::SupplyInvariantViolation { .. }));
    }

    #[test]
    fn internal_transfers_keep_supply() {
        let alice = ParticipantId::new();
        let mut ledger = EscrowLedger::new();
        let mut sc = SupplyConservation::new();

        ledger
            .deposit(&Account::Participant(alice), "USDC", Decimal::new(100, 0))
            .unwrap();
        sc.record_deposit("USDC", Decimal::new(100, 0));
        ledger
            .apply_atomic(&[
                Transfer::freeze(Account::Participant(alice), "USDC", Decimal::new(40, 0)),
                Transfer::consume(
                    Account::Participant(alice),
                    Account::Treasury,
                    "USDC",
                    Decimal::new(15, 0),
                ),
            ])
            .unwrap();
        sc.verify_ledger(&ledger).unwrap();

        ledger.withdraw(alice, "USDC", Decimal::new(60, 0)).unwrap();
        assert!(sc.verify_ledger(&ledger).is_err());
        sc.record_withdrawal("USDC", Decimal::new(60, 0));
        sc.verify_ledger(&ledger).unwrap();
    }

    #[test]
    fn unrecorded_ledger_asset_detected() {
        let mut ledger = EscrowLedger::new();
        ledger
            .deposit(&Account::Treasury, "ETH", Decimal::ONE)
            .unwrap();
        let err = SupplyConservation::new().verify_ledger(&ledger).unwrap_err();
        assert!(matches!(err, FairbatchError::SupplyInvariantViolation { .. }));
    }
}

//! Escrow ledger.
//!
//! Tracks per-(account, asset) balances with available/frozen accounting.
//! Single-entry mutations check before they write; multi-entry mutations go
//! through [`EscrowLedger::apply_atomic`], which stages every touched entry on
//! a copy and commits only if the whole list validates.
//!
//! Value enters the ledger through `deposit` and leaves only through
//! `withdraw`. Everything in between is a balanced [`Transfer`].

use std::collections::{BTreeSet, HashMap};

use fairbatch_types::{
    Account, Asset, BalanceEntry, Bucket, FairbatchError, ParticipantId, Result, Transfer,
};
use rust_decimal::Decimal;

/// Source of truth for all balances in the engine. Single writer.
#[derive(Debug, Clone, Default)]
pub struct EscrowLedger {
    balances: HashMap<(Account, Asset), BalanceEntry>,
}

fn positive(amount: Decimal, what: &str) -> Result<()> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(FairbatchError::InvalidAmount {
            amount,
            reason: format!("{what} amount must be positive"),
        })
    }
}

impl EscrowLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// External inflow into an account's available balance.
    pub fn deposit(&mut self, account: &Account, asset: &str, amount: Decimal) -> Result<()> {
        positive(amount, "deposit")?;
        self.entry_mut(account, asset).available += amount;
        tracing::debug!(account = %account, asset, %amount, "deposit");
        Ok(())
    }

    /// External outflow from a participant's escrow custody.
    ///
    /// # Errors
    /// `InsufficientBalance` if available < amount.
    pub fn withdraw(&mut self, participant: ParticipantId, asset: &str, amount: Decimal) -> Result<()> {
        positive(amount, "withdraw")?;
        let account = Account::Participant(participant);
        let available = self.balance(&account, asset).available;
        if available < amount {
            return Err(FairbatchError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.entry_mut(&account, asset).available -= amount;
        tracing::debug!(participant = %participant, asset, %amount, "withdraw");
        Ok(())
    }

    /// Freeze funds (available → frozen).
    ///
    /// # Errors
    /// `InsufficientBalance` if available < amount.
    pub fn freeze(&mut self, account: &Account, asset: &str, amount: Decimal) -> Result<()> {
        let available = self.balance(account, asset).available;
        if available < amount {
            return Err(FairbatchError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        let entry = self.entry_mut(account, asset);
        entry.available -= amount;
        entry.frozen += amount;
        Ok(())
    }

    /// Apply a list of transfers all-or-nothing.
    ///
    /// Transfers apply in order against a staged copy of the touched
    /// entries. Zero-amount transfers are skipped.
    ///
    /// # Errors
    /// - `InvalidAmount` for a negative amount
    /// - `InsufficientBalance` if an available bucket would go negative
    /// - `DoubleSpendAttempt` if a frozen bucket would go negative
    ///
    /// On error the ledger is unchanged.
    pub fn apply_atomic(&mut self, transfers: &[Transfer]) -> Result<()> {
        let mut staged: HashMap<(Account, Asset), BalanceEntry> = HashMap::new();

        for t in transfers {
            if t.amount < Decimal::ZERO {
                return Err(FairbatchError::InvalidAmount {
                    amount: t.amount,
                    reason: format!("negative transfer {t}"),
                });
            }
            if t.amount.is_zero() {
                continue;
            }

            let from_key = (t.from.clone(), t.asset.clone());
            let source = staged
                .entry(from_key.clone())
                .or_insert_with(|| self.balances.get(&from_key).cloned().unwrap_or_default());
            let bucket = source.bucket_mut(t.from_bucket);
            if *bucket < t.amount {
                return Err(match t.from_bucket {
                    Bucket::Available => FairbatchError::InsufficientBalance {
                        needed: t.amount,
                        available: *bucket,
                    },
                    Bucket::Frozen => FairbatchError::DoubleSpendAttempt {
                        reason: format!("{t} exceeds frozen balance {bucket}"),
                    },
                });
            }
            *bucket -= t.amount;

            let to_key = (t.to.clone(), t.asset.clone());
            let dest = staged
                .entry(to_key.clone())
                .or_insert_with(|| self.balances.get(&to_key).cloned().unwrap_or_default());
            *dest.bucket_mut(t.to_bucket) += t.amount;
        }

        let touched = staged.len();
        self.balances.extend(staged);
        tracing::debug!(transfers = transfers.len(), touched, "atomic transfer batch applied");
        Ok(())
    }

    /// Balance for an (account, asset) pair. Zero if never touched.
    #[must_use]
    pub fn balance(&self, account: &Account, asset: &str) -> BalanceEntry {
        self.balances
            .get(&(account.clone(), asset.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Convenience for a participant's custody balance.
    #[must_use]
    pub fn participant_balance(&self, participant: ParticipantId, asset: &str) -> BalanceEntry {
        self.balance(&Account::Participant(participant), asset)
    }

    /// Total supply of an asset across every account (available + frozen).
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, entry)| entry.total())
            .sum()
    }

    /// Every asset the ledger has seen, sorted.
    #[must_use]
    pub fn assets(&self) -> Vec<Asset> {
        self.balances
            .keys()
            .map(|(_, a)| a.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn entry_mut(&mut self, account: &Account, asset: &str) -> &mut BalanceEntry {
        self.balances
            .entry((account.clone(), asset.to_string()))
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(amount: i64) -> (EscrowLedger, ParticipantId, Account) {
        let mut ledger = EscrowLedger::new();
        let user = ParticipantId::new();
        let account = Account::Participant(user);
        ledger
            .deposit(&account, "USDC", Decimal::new(amount, 0))
            .unwrap();
        (ledger, user, account)
    }

    #[test]
    fn deposit_increases_available() {
        let (ledger, user, _) = funded(1000);
        let bal = ledger.participant_balance(user, "USDC");
        assert_eq!(bal.available, Decimal::new(1000, 0));
        assert_eq!(bal.frozen, Decimal::ZERO);
    }

    #[test]
    fn non_positive_deposit_rejected() {
        let mut ledger = EscrowLedger::new();
        let err = ledger
            .deposit(&Account::Treasury, "USDC", Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, FairbatchError::InvalidAmount { .. }));
    }

    #[test]
    fn freeze_and_unfreeze() {
        let (mut ledger, user, account) = funded(1000);
        ledger.freeze(&account, "USDC", Decimal::new(400, 0)).unwrap();
        let bal = ledger.participant_balance(user, "USDC");
        assert_eq!(bal.available, Decimal::new(600, 0));
        assert_eq!(bal.frozen, Decimal::new(400, 0));

        ledger
            .apply_atomic(&[Transfer::unfreeze(account, "USDC", Decimal::new(400, 0))])
            .unwrap();
        let bal = ledger.participant_balance(user, "USDC");
        assert_eq!(bal.available, Decimal::new(1000, 0));
        assert_eq!(bal.frozen, Decimal::ZERO);
    }

    #[test]
    fn freeze_insufficient_fails_unchanged() {
        let (mut ledger, user, account) = funded(100);
        let err = ledger
            .freeze(&account, "USDC", Decimal::new(200, 0))
            .unwrap_err();
        assert!(matches!(err, FairbatchError::InsufficientBalance { .. }));
        assert_eq!(
            ledger.participant_balance(user, "USDC").available,
            Decimal::new(100, 0)
        );
    }

    #[test]
    fn withdraw_reduces_supply() {
        let (mut ledger, user, _) = funded(1000);
        ledger.withdraw(user, "USDC", Decimal::new(300, 0)).unwrap();
        assert_eq!(ledger.total_supply("USDC"), Decimal::new(700, 0));
        let err = ledger
            .withdraw(user, "USDC", Decimal::new(701, 0))
            .unwrap_err();
        assert!(matches!(err, FairbatchError::InsufficientBalance { .. }));
    }

    #[test]
    fn apply_atomic_commits_all() {
        let (mut ledger, user, account) = funded(1000);
        let transfers = vec![
            Transfer::freeze(account.clone(), "USDC", Decimal::new(600, 0)),
            Transfer::consume(account.clone(), Account::Insurance, "USDC", Decimal::new(100, 0)),
            Transfer::unfreeze(account, "USDC", Decimal::new(500, 0)),
        ];
        ledger.apply_atomic(&transfers).unwrap();
        let bal = ledger.participant_balance(user, "USDC");
        assert_eq!(bal.available, Decimal::new(900, 0));
        assert_eq!(bal.frozen, Decimal::ZERO);
        assert_eq!(
            ledger.balance(&Account::Insurance, "USDC").available,
            Decimal::new(100, 0)
        );
        assert_eq!(ledger.total_supply("USDC"), Decimal::new(1000, 0));
    }

    #[test]
    fn apply_atomic_rolls_back_on_failure() {
        let (mut ledger, user, account) = funded(1000);
        ledger.freeze(&account, "USDC", Decimal::new(200, 0)).unwrap();
        let before = ledger.clone();

        let transfers = vec![
            Transfer::consume(account.clone(), Account::Treasury, "USDC", Decimal::new(150, 0)),
            // Only 50 left frozen: this one must fail and undo the first.
            Transfer::consume(account, Account::Burn, "USDC", Decimal::new(100, 0)),
        ];
        let err = ledger.apply_atomic(&transfers).unwrap_err();
        assert!(matches!(err, FairbatchError::DoubleSpendAttempt { .. }));
        assert_eq!(
            ledger.participant_balance(user, "USDC"),
            before.participant_balance(user, "USDC")
        );
        assert!(ledger.balance(&Account::Treasury, "USDC").is_zero());
    }

    #[test]
    fn apply_atomic_rejects_negative() {
        let (mut ledger, _, account) = funded(10);
        let err = ledger
            .apply_atomic(&[Transfer::pay(
                account,
                Account::Treasury,
                "USDC",
                Decimal::new(-1, 0),
            )])
            .unwrap_err();
        assert!(matches!(err, FairbatchError::InvalidAmount { .. }));
    }

    #[test]
    fn assets_sorted_and_unique() {
        let (mut ledger, _, account) = funded(10);
        ledger.deposit(&account, "ETH", Decimal::ONE).unwrap();
        ledger.deposit(&Account::Treasury, "ETH", Decimal::ONE).unwrap();
        assert_eq!(ledger.assets(), vec!["ETH".to_string(), "USDC".to_string()]);
    }
}

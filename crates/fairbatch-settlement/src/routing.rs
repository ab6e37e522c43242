//! Proceeds router: delivers protocol amounts to the treasury collaborator.
//!
//! Two steps:
//!
//! 1. **Sweep**: once per batch, move the allocation's treasury portion from
//!    `Proceeds(batch)` to the `Treasury` ledger account.
//! 2. **Deliver**: every delivery is queued in an outbox keyed by
//!    `(batch, tag)` and handed to the external [`Treasury`]. A failed call
//!    stays queued and is retried by [`ProceedsRouter::retry_pending`]; a
//!    delivered key is never sent twice.
//!
//! Slash shares already sit in the `Treasury`, `Insurance` and `Bounty`
//! accounts (the slash moved them there), so they are delivered without a
//! sweep. Burned shares are not delivered anywhere.
//!
//! Delivery never blocks the batch: the ledger side is final after the
//! sweep, and the outbox outlives the batch.

use std::collections::BTreeMap;

use fairbatch_ingress::EscrowLedger;
use fairbatch_types::{
    Account, Asset, BatchId, RewardAllocation, Result, SlashEvent, SlashSplit, Transfer, Treasury,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::idempotency::IdempotencyGuard;

/// One outbound treasury deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub asset: Asset,
    pub amount: Decimal,
    /// Source tag, e.g. `proceeds:USDC` or `slash-insurance:ETH`. Unique per batch.
    pub tag: String,
}

impl Delivery {
    /// Key handed to the collaborator for de-duplication.
    #[must_use]
    pub fn idempotency_key(&self, batch_id: BatchId) -> String {
        format!("{batch_id}:{}", self.tag)
    }
}

/// Outcome of a routing pass for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStatus {
    pub batch_id: BatchId,
    pub swept: bool,
    pub delivered: Vec<Delivery>,
    pub pending: Vec<Delivery>,
}

impl RoutingStatus {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.swept && self.pending.is_empty()
    }
}

/// Slash shares handed to the treasury collaborator, by tag prefix.
fn delivered_shares(split: &SlashSplit) -> [(&'static str, Decimal); 3] {
    [
        ("slash-treasury", split.treasury),
        ("slash-insurance", split.insurance),
        ("slash-bounty", split.bounty),
    ]
}

/// Routes batch proceeds and slash shares to the treasury.
#[derive(Debug, Clone, Default)]
pub struct ProceedsRouter {
    swept: IdempotencyGuard<BatchId>,
    delivered: IdempotencyGuard<(BatchId, String)>,
    outbox: BTreeMap<(BatchId, String), Delivery>,
}

impl ProceedsRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything owed to the treasury for one batch, in a stable order.
    #[must_use]
    pub fn deliveries(allocation: &RewardAllocation, slashes: &[SlashEvent]) -> Vec<Delivery> {
        let mut out: Vec<Delivery> = allocation
            .treasury
            .iter()
            .filter(|(_, amount)| **amount > Decimal::ZERO)
            .map(|(asset, amount)| Delivery {
                asset: asset.clone(),
                amount: *amount,
                tag: format!("proceeds:{asset}"),
            })
            .collect();

        let mut slashed: BTreeMap<(usize, &Asset), (&str, Decimal)> = BTreeMap::new();
        for event in slashes {
            for (rank, (prefix, amount)) in delivered_shares(&event.split).into_iter().enumerate() {
                slashed.entry((rank, &event.asset)).or_insert((prefix, Decimal::ZERO)).1 += amount;
            }
        }
        out.extend(
            slashed
                .into_iter()
                .filter(|(_, (_, amount))| *amount > Decimal::ZERO)
                .map(|((_, asset), (prefix, amount))| Delivery {
                    asset: asset.clone(),
                    amount,
                    tag: format!("{prefix}:{asset}"),
                }),
        );
        out
    }

    /// Sweep (once), queue the batch's deliveries and try each of them.
    ///
    /// # Errors
    /// Only a ledger failure during the sweep. Collaborator failures stay
    /// queued and are reported as pending.
    pub fn route(
        &mut self,
        ledger: &mut EscrowLedger,
        treasury: &dyn Treasury,
        allocation: &RewardAllocation,
        slashes: &[SlashEvent],
    ) -> Result<RoutingStatus> {
        let batch_id = allocation.batch_id;

        if !self.swept.contains(&batch_id) {
            let sweep: Vec<Transfer> = allocation
                .treasury
                .iter()
                .map(|(asset, amount)| {
                    Transfer::pay(
                        Account::Proceeds(batch_id),
                        Account::Treasury,
                        asset.clone(),
                        *amount,
                    )
                })
                .collect();
            ledger.apply_atomic(&sweep)?;
            self.swept.mark(batch_id);
        }

        let mut delivered = Vec::new();
        let mut pending = Vec::new();
        for delivery in Self::deliveries(allocation, slashes) {
            let key = (batch_id, delivery.tag.clone());
            if self.delivered.contains(&key) {
                delivered.push(delivery);
                continue;
            }
            self.outbox.insert(key.clone(), delivery.clone());
            if self.send(treasury, &key) {
                delivered.push(delivery);
            } else {
                pending.push(delivery);
            }
        }

        let status = RoutingStatus {
            batch_id,
            swept: true,
            delivered,
            pending,
        };
        if status.is_complete() {
            tracing::info!(batch = batch_id.0, deliveries = status.delivered.len(), "proceeds routed");
        } else {
            tracing::warn!(
                batch = batch_id.0,
                pending = status.pending.len(),
                "treasury deliveries queued for retry"
            );
        }
        Ok(status)
    }

    /// Try every queued delivery once more. Returns how many remain queued.
    pub fn retry_pending(&mut self, treasury: &dyn Treasury) -> usize {
        let keys: Vec<(BatchId, String)> = self.outbox.keys().cloned().collect();
        for key in keys {
            self.send(treasury, &key);
        }
        self.outbox.len()
    }

    /// Queued deliveries, oldest batch first.
    pub fn pending(&self) -> impl Iterator<Item = (BatchId, &Delivery)> {
        self.outbox.iter().map(|((batch_id, _), d)| (*batch_id, d))
    }

    /// Hand one queued delivery to the collaborator; `true` once delivered.
    fn send(&mut self, treasury: &dyn Treasury, key: &(BatchId, String)) -> bool {
        let Some(delivery) = self.outbox.get(key) else {
            return self.delivered.contains(key);
        };
        let batch_id = key.0;
        match treasury.deposit(
            &delivery.asset,
            delivery.amount,
            &delivery.tag,
            &delivery.idempotency_key(batch_id),
        ) {
            Ok(()) => {
                self.outbox.remove(key);
                self.delivered.mark(key.clone());
                true
            }
            Err(err) => {
                tracing::warn!(
                    batch = batch_id.0,
                    tag = %delivery.tag,
                    amount = %delivery.amount,
                    error = %err,
                    "treasury delivery failed, will retry"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fairbatch_types::{
        CommitmentId, FairbatchError, InMemoryTreasury, ParticipantId, SlashReason, SlashSplit,
    };

    use super::*;

    fn allocation(treasury_usdc: i64) -> RewardAllocation {
        RewardAllocation {
            batch_id: BatchId(4),
            era: 1,
            contributions: vec![],
            shares: vec![],
            distributable: BTreeMap::new(),
            treasury: BTreeMap::from([("USDC".to_string(), Decimal::new(treasury_usdc, 0))]),
        }
    }

    fn slash(asset: &str, treasury: i64) -> SlashEvent {
        SlashEvent {
            participant: ParticipantId::new(),
            batch_id: BatchId(4),
            commitment: CommitmentId::derive(BatchId(4), 0),
            asset: asset.into(),
            collateral: Decimal::new(treasury * 4, 0),
            slashed: Decimal::new(treasury * 2, 0),
            refund: Decimal::new(treasury * 2, 0),
            split: SlashSplit {
                treasury: Decimal::new(treasury, 0),
                insurance: Decimal::new(treasury, 0),
                ..SlashSplit::default()
            },
            reason: SlashReason::NonReveal,
        }
    }

    /// Fails the first `failures` calls.
    struct FlakyTreasury {
        failures: AtomicUsize,
        inner: InMemoryTreasury,
    }

    impl Treasury for FlakyTreasury {
        fn deposit(&self, asset: &Asset, amount: Decimal, tag: &str, key: &str) -> Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(FairbatchError::Internal("treasury unavailable".into()));
            }
            self.inner.deposit(asset, amount, tag, key)
        }
    }

    fn funded_ledger() -> EscrowLedger {
        let mut ledger = EscrowLedger::new();
        ledger
            .deposit(&Account::Proceeds(BatchId(4)), "USDC", Decimal::new(10, 0))
            .unwrap();
        ledger
    }

    #[test]
    fn deliveries_merge_proceeds_and_slashes() {
        let out = ProceedsRouter::deliveries(
            &allocation(5),
            &[slash("ETH", 2), slash("ETH", 3), slash("USDC", 1)],
        );
        let tags: Vec<&str> = out.iter().map(|d| d.tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "proceeds:USDC",
                "slash-treasury:ETH",
                "slash-treasury:USDC",
                "slash-insurance:ETH",
                "slash-insurance:USDC",
            ]
        );
        assert_eq!(out[1].amount, Decimal::new(5, 0));
        assert_eq!(out[3].amount, Decimal::new(5, 0));
    }

    #[test]
    fn every_slash_destination_but_burn_is_delivered() {
        let mut event = slash("ETH", 2);
        event.split.burn = Decimal::new(7, 0);
        event.split.bounty = Decimal::ONE;
        let mut ledger = funded_ledger();
        let treasury = InMemoryTreasury::new();
        let mut router = ProceedsRouter::new();

        let status = router
            .route(&mut ledger, &treasury, &allocation(0), &[event])
            .unwrap();
        assert!(status.is_complete());
        let tags: Vec<&str> = status.delivered.iter().map(|d| d.tag.as_str()).collect();
        assert_eq!(tags, vec!["slash-treasury:ETH", "slash-insurance:ETH", "slash-bounty:ETH"]);
        // 2 treasury + 2 insurance + 1 bounty; the 7 burned never leave.
        assert_eq!(treasury.total("ETH"), Decimal::new(5, 0));
    }

    #[test]
    fn route_sweeps_once_and_delivers() {
        let mut ledger = funded_ledger();
        let treasury = InMemoryTreasury::new();
        let mut router = ProceedsRouter::new();

        let status = router.route(&mut ledger, &treasury, &allocation(4), &[]).unwrap();
        assert!(status.is_complete());
        assert_eq!(ledger.balance(&Account::Treasury, "USDC").available, Decimal::new(4, 0));
        assert_eq!(
            ledger.balance(&Account::Proceeds(BatchId(4)), "USDC").available,
            Decimal::new(6, 0)
        );

        let again = router.route(&mut ledger, &treasury, &allocation(4), &[]).unwrap();
        assert!(again.is_complete());
        assert_eq!(ledger.balance(&Account::Treasury, "USDC").available, Decimal::new(4, 0));
        assert_eq!(treasury.deposit_count(), 1);
        assert_eq!(treasury.total("USDC"), Decimal::new(4, 0));
    }

    #[test]
    fn failed_delivery_retried() {
        let mut ledger = funded_ledger();
        let treasury = FlakyTreasury {
            failures: AtomicUsize::new(1),
            inner: InMemoryTreasury::new(),
        };
        let mut router = ProceedsRouter::new();

        let first = router.route(&mut ledger, &treasury, &allocation(4), &[]).unwrap();
        assert!(!first.is_complete());
        assert_eq!(first.pending.len(), 1);

        assert_eq!(router.pending().count(), 1);

        assert_eq!(router.retry_pending(&treasury), 0);
        assert_eq!(treasury.inner.total("USDC"), Decimal::new(4, 0));
        assert_eq!(router.pending().count(), 0);

        // Routing the batch again neither sweeps nor sends twice.
        let again = router.route(&mut ledger, &treasury, &allocation(4), &[]).unwrap();
        assert!(again.is_complete());
        assert_eq!(treasury.inner.total("USDC"), Decimal::new(4, 0));
        assert_eq!(ledger.balance(&Account::Treasury, "USDC").available, Decimal::new(4, 0));
    }

    #[test]
    fn unfunded_sweep_fails_without_marking() {
        let mut ledger = EscrowLedger::new();
        let treasury = InMemoryTreasury::new();
        let mut router = ProceedsRouter::new();
        assert!(router.route(&mut ledger, &treasury, &allocation(4), &[]).is_err());
        assert_eq!(treasury.deposit_count(), 0);
    }
}

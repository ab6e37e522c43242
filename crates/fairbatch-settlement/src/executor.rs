//! Settlement executor.
//!
//! Turns a batch's clearing result into one atomic list of ledger
//! transfers:
//!
//! ```text
//! 1. intake   every fill's input leaves the owner's frozen collateral
//!             into the counterparty account (Clearing(batch) or Pool(pair))
//! 2. payout   the counterparty pays the output asset, fee withheld
//!             into Proceeds(batch)
//! 3. returns  whatever collateral the fill did not use is unfrozen back
//!             into the owner's custody
//! ```
//!
//! Intake precedes payout so the clearing account never goes negative
//! mid-list; it nets to zero at the end. The list is checked before it is
//! applied and the supply invariant is checked after. A settled batch's
//! report is cached; settling it again returns the cached copy without
//! touching the ledger.

use std::collections::BTreeMap;

use fairbatch_ingress::EscrowLedger;
use fairbatch_types::amount::bps_of;
use fairbatch_types::{
    Account, Asset, BatchId, ClearingResult, Commitment, Counterparty, Direction, FairbatchError,
    Order, OrderOutcome, OrderSettlement, PricingProvider, ProtocolConfig, Result,
    SettlementReport, Transfer,
};
use rust_decimal::Decimal;

use crate::supply_conservation::SupplyConservation;

/// Applies clearing results to the escrow ledger, at most once per batch.
#[derive(Debug, Clone)]
pub struct SettlementExecutor {
    fee_rate_bps: u32,
    reports: BTreeMap<BatchId, SettlementReport>,
}

/// What settling a batch would do, before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub orders: Vec<OrderSettlement>,
    pub transfers: Vec<Transfer>,
    pub fees: BTreeMap<Asset, Decimal>,
    pub priority_payments: BTreeMap<Asset, Decimal>,
}

impl SettlementExecutor {
    #[must_use]
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            fee_rate_bps: config.fee_rate_bps,
            reports: BTreeMap::new(),
        }
    }

    /// Cached report of a settled batch.
    #[must_use]
    pub fn report(&self, batch_id: BatchId) -> Option<&SettlementReport> {
        self.reports.get(&batch_id)
    }

    #[must_use]
    pub fn is_settled(&self, batch_id: BatchId) -> bool {
        self.reports.contains_key(&batch_id)
    }

    /// Settle one batch.
    ///
    /// `orders` are the batch's revealed orders; `commitments` must contain
    /// the commitment behind each of them.
    ///
    /// # Errors
    /// - `SettlementFailure` if the plan is inconsistent or the ledger
    ///   rejects it (the ledger is then unchanged and the call can be retried)
    /// - `SupplyInvariantViolation` if supply moved after the apply
    pub fn settle(
        &mut self,
        ledger: &mut EscrowLedger,
        supply: &SupplyConservation,
        pricing: &dyn PricingProvider,
        clearing: &ClearingResult,
        orders: &[Order],
        commitments: &[Commitment],
    ) -> Result<SettlementReport> {
        let batch_id = clearing.batch_id;
        if let Some(report) = self.reports.get(&batch_id) {
            tracing::debug!(batch = batch_id.0, "settlement already applied, returning cached report");
            return Ok(report.clone());
        }

        let plan = plan_settlement(clearing, orders, commitments, self.fee_rate_bps)?;
        check_clearing_nets_to_zero(batch_id, &plan.transfers)?;

        ledger
            .apply_atomic(&plan.transfers)
            .map_err(|err| FairbatchError::SettlementFailure {
                reason: format!("{batch_id}: ledger rejected settlement: {err}"),
            })?;
        supply.verify_ledger(ledger)?;

        for fill in clearing.fills().filter(|f| f.counterparty == Counterparty::Pool) {
            if let Err(err) = pricing.apply_trade(&fill.pair, fill.direction, fill.amount, fill.price) {
                tracing::warn!(
                    batch = batch_id.0,
                    pair = %fill.pair,
                    order = %fill.order_id,
                    error = %err,
                    "pool did not accept trade notification"
                );
            }
        }

        let report = SettlementReport {
            batch_id,
            orders: plan.orders,
            transfers: plan.transfers,
            fees: plan.fees,
            priority_payments: plan.priority_payments,
            fill_root: clearing.fill_root,
        };

        tracing::info!(
            batch = batch_id.0,
            orders = report.orders.len(),
            transfers = report.transfers.len(),
            filled = report
                .orders
                .iter()
                .filter(|o| o.outcome != OrderOutcome::Unmatched)
                .count(),
            "batch settled"
        );

        self.reports.insert(batch_id, report.clone());
        Ok(report)
    }
}

/// Build the transfer list and per-order lines for a batch.
///
/// # Errors
/// `SettlementFailure` if an order has no commitment or a fill would use
/// more than the posted collateral.
pub fn plan_settlement(
    clearing: &ClearingResult,
    orders: &[Order],
    commitments: &[Commitment],
    fee_rate_bps: u32,
) -> Result<SettlementPlan> {
    let batch_id = clearing.batch_id;
    let proceeds = Account::Proceeds(batch_id);

    let mut intake = Vec::new();
    let mut payout = Vec::new();
    let mut returns = Vec::new();
    let mut lines = Vec::with_capacity(orders.len());
    let mut fees: BTreeMap<Asset, Decimal> = BTreeMap::new();
    let mut priority_payments: BTreeMap<Asset, Decimal> = BTreeMap::new();

    for order in orders {
        let commitment = commitments
            .iter()
            .find(|c| c.id == order.id)
            .ok_or_else(|| FairbatchError::SettlementFailure {
                reason: format!("{batch_id}: order {} has no commitment", order.id),
            })?;
        let owner = Account::Participant(order.participant);
        let input_asset = order.fields.input_asset();
        let output_asset = order.fields.output_asset();

        let (filled, price, counterparty) = clearing
            .fill_for(order.id)
            .map_or((Decimal::ZERO, Decimal::ZERO, None), |f| {
                (f.amount, f.price, Some(f.counterparty))
            });
        let notional = filled.checked_mul(price).ok_or_else(|| FairbatchError::SettlementFailure {
            reason: format!("{batch_id}: order {} notional overflows ({filled} at {price})", order.id),
        })?;
        let (input_consumed, gross) = match order.direction() {
            Direction::Buy => (notional, filled),
            Direction::Sell => (filled, notional),
        };
        let fee = bps_of(gross, fee_rate_bps);
        let received = gross - fee;

        if let Some(counterparty) = counterparty {
            let source = match counterparty {
                Counterparty::Batch => Account::Clearing(batch_id),
                Counterparty::Pool => Account::Pool(order.pair().clone()),
            };
            intake.push(Transfer::consume(
                owner.clone(),
                source.clone(),
                input_asset.clone(),
                input_consumed,
            ));
            payout.push(Transfer::pay(
                source.clone(),
                owner.clone(),
                output_asset.clone(),
                received,
            ));
            payout.push(Transfer::pay(source, proceeds.clone(), output_asset.clone(), fee));
            *fees.entry(output_asset.clone()).or_default() += fee;
        }

        let returned = commitment.collateral.amount - input_consumed;
        if returned < Decimal::ZERO {
            return Err(FairbatchError::SettlementFailure {
                reason: format!(
                    "{batch_id}: order {} consumes {input_consumed} but posted {}",
                    order.id, commitment.collateral
                ),
            });
        }
        returns.push(Transfer::unfreeze(
            owner,
            commitment.collateral.asset.clone(),
            returned,
        ));

        if order.has_priority() {
            *priority_payments
                .entry(order.pair().quote.clone())
                .or_default() += order.fields.priority_bid;
        }

        let outcome = if filled.is_zero() {
            OrderOutcome::Unmatched
        } else if filled < order.fields.amount {
            OrderOutcome::PartiallyFilled
        } else {
            OrderOutcome::Filled
        };
        tracing::debug!(
            batch = batch_id.0,
            order = %order.id,
            participant = %order.participant,
            %outcome,
            %filled,
            %returned,
            "order settled"
        );
        lines.push(OrderSettlement {
            order_id: order.id,
            participant: order.participant,
            pair: order.pair().clone(),
            direction: order.direction(),
            outcome,
            requested: order.fields.amount,
            filled,
            notional,
            input_consumed,
            received,
            fee,
            returned,
        });
    }

    let mut transfers = intake;
    transfers.extend(payout);
    transfers.extend(returns);

    Ok(SettlementPlan {
        orders: lines,
        transfers,
        fees,
        priority_payments,
    })
}

/// Every asset paid into the batch clearing account must be paid out again.
fn check_clearing_nets_to_zero(batch_id: BatchId, transfers: &[Transfer]) -> Result<()> {
    let house = Account::Clearing(batch_id);
    let mut net: BTreeMap<&str, Decimal> = BTreeMap::new();
    for t in transfers {
        if t.to == house {
            *net.entry(t.asset.as_str()).or_default() += t.amount;
        }
        if t.from == house {
            *net.entry(t.asset.as_str()).or_default() -= t.amount;
        }
    }
    match net.into_iter().find(|(_, residue)| !residue.is_zero()) {
        None => Ok(()),
        Some((asset, residue)) => {
            tracing::error!(batch = batch_id.0, asset, %residue, "clearing account does not net to zero");
            Err(FairbatchError::SettlementFailure {
                reason: format!("{batch_id}: clearing account left {residue} {asset}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fairbatch_matchcore::clear_batch;
    use fairbatch_types::{
        AssetAmount, Digest, NoPool, ParticipantId, RevealStatus, StaticPool,
    };

    use super::*;

    struct Fixture {
        ledger: EscrowLedger,
        supply: SupplyConservation,
        orders: Vec<Order>,
        commitments: Vec<Commitment>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ledger: EscrowLedger::new(),
                supply: SupplyConservation::new(),
                orders: Vec::new(),
                commitments: Vec::new(),
            }
        }

        fn deposit(&mut self, account: &Account, asset: &str, amount: Decimal) {
            self.ledger.deposit(account, asset, amount).unwrap();
            self.supply.record_deposit(asset, amount);
        }

        /// Fund, freeze and record one fully collateralized order.
        fn add(&mut self, direction: Direction, limit: i64, amount: i64) -> Order {
            let participant = ParticipantId::new();
            let seq = self.orders.len() as u64;
            let order = Order::dummy_for(
                participant,
                direction,
                Decimal::new(limit, 0),
                Decimal::new(amount, 0),
                seq,
            );
            let collateral = AssetAmount::new(
                order.fields.input_asset().clone(),
                order.fields.max_input().unwrap(),
            );
            let owner = Account::Participant(participant);
            self.deposit(&owner, &collateral.asset, collateral.amount);
            self.ledger
                .freeze(&owner, &collateral.asset, collateral.amount)
                .unwrap();
            self.commitments.push(Commitment {
                id: order.id,
                batch_id: order.batch_id,
                participant,
                digest: Digest::default(),
                collateral,
                arrival_seq: seq,
                committed_at: Utc::now(),
                status: RevealStatus::Revealed,
                priority_bid: Some(order.fields.priority_bid),
            });
            self.orders.push(order.clone());
            order
        }

        fn clear(&self, pricing: &dyn PricingProvider) -> ClearingResult {
            clear_batch(BatchId(1), &self.orders, pricing, &ProtocolConfig::default())
        }
    }

    fn balance(ledger: &EscrowLedger, order: &Order, asset: &str) -> (Decimal, Decimal) {
        let entry = ledger.participant_balance(order.participant, asset);
        (entry.available, entry.frozen)
    }

    #[test]
    fn eighty_twenty_returns_unmatched_buy() {
        let mut fx = Fixture::new();
        let buy = fx.add(Direction::Buy, 100, 80);
        let sell = fx.add(Direction::Sell, 100, 20);
        let clearing = fx.clear(&NoPool);

        let mut executor = SettlementExecutor::new(&ProtocolConfig::default());
        let report = executor
            .settle(&mut fx.ledger, &fx.supply, &NoPool, &clearing, &fx.orders, &fx.commitments)
            .unwrap();

        let buy_line = report.order(buy.id).unwrap();
        assert_eq!(buy_line.outcome, OrderOutcome::PartiallyFilled);
        assert_eq!(buy_line.filled, Decimal::new(20, 0));
        assert_eq!(buy_line.input_consumed, Decimal::new(2000, 0));
        assert_eq!(buy_line.returned, Decimal::new(6000, 0));

        // 5 bps fee on the received side.
        assert_eq!(
            balance(&fx.ledger, &buy, "USDC"),
            (Decimal::new(6000, 0), Decimal::ZERO)
        );
        assert_eq!(
            balance(&fx.ledger, &buy, "ETH"),
            (Decimal::new(1999, 2), Decimal::ZERO)
        );
        assert_eq!(
            balance(&fx.ledger, &sell, "USDC"),
            (Decimal::new(1999, 0), Decimal::ZERO)
        );
        assert_eq!(balance(&fx.ledger, &sell, "ETH"), (Decimal::ZERO, Decimal::ZERO));

        let proceeds = Account::Proceeds(BatchId(1));
        assert_eq!(fx.ledger.balance(&proceeds, "USDC").available, Decimal::ONE);
        assert_eq!(fx.ledger.balance(&proceeds, "ETH").available, Decimal::new(1, 2));
        assert_eq!(report.fees.get("USDC"), Some(&Decimal::ONE));

        let house = Account::Clearing(BatchId(1));
        assert!(fx.ledger.balance(&house, "USDC").is_zero());
        assert!(fx.ledger.balance(&house, "ETH").is_zero());
        fx.supply.verify_ledger(&fx.ledger).unwrap();
    }

    #[test]
    fn oversized_fill_is_a_settlement_failure() {
        let mut fx = Fixture::new();
        fx.add(Direction::Buy, 100, 5);
        fx.add(Direction::Sell, 100, 5);
        let mut clearing = fx.clear(&NoPool);
        for fill in &mut clearing.pairs[0].fills {
            fill.amount = Decimal::MAX;
            fill.price = Decimal::MAX;
        }

        let err = plan_settlement(&clearing, &fx.orders, &fx.commitments, 5).unwrap_err();
        assert!(matches!(err, FairbatchError::SettlementFailure { .. }));
    }

    #[test]
    fn collateral_is_fully_accounted() {
        let mut fx = Fixture::new();
        fx.add(Direction::Buy, 105, 3);
        fx.add(Direction::Buy, 101, 4);
        fx.add(Direction::Buy, 97, 2);
        fx.add(Direction::Sell, 99, 5);
        fx.add(Direction::Sell, 103, 1);
        let clearing = fx.clear(&NoPool);

        let plan = plan_settlement(&clearing, &fx.orders, &fx.commitments, 5).unwrap();
        for (line, commitment) in plan.orders.iter().zip(&fx.commitments) {
            assert_eq!(
                line.input_consumed + line.returned,
                commitment.collateral.amount,
                "order {} leaks collateral",
                line.order_id
            );
        }
    }

    #[test]
    fn settle_is_idempotent() {
        let mut fx = Fixture::new();
        fx.add(Direction::Buy, 100, 5);
        fx.add(Direction::Sell, 100, 5);
        let clearing = fx.clear(&NoPool);

        let mut executor = SettlementExecutor::new(&ProtocolConfig::default());
        let first = executor
            .settle(&mut fx.ledger, &fx.supply, &NoPool, &clearing, &fx.orders, &fx.commitments)
            .unwrap();
        let snapshot = fx.ledger.clone();
        let second = executor
            .settle(&mut fx.ledger, &fx.supply, &NoPool, &clearing, &fx.orders, &fx.commitments)
            .unwrap();

        assert_eq!(first, second);
        assert!(executor.is_settled(BatchId(1)));
        for asset in snapshot.assets() {
            assert_eq!(snapshot.total_supply(&asset), fx.ledger.total_supply(&asset));
        }
        let proceeds = Account::Proceeds(BatchId(1));
        assert_eq!(
            snapshot.balance(&proceeds, "USDC"),
            fx.ledger.balance(&proceeds, "USDC")
        );
    }

    #[test]
    fn failed_pair_returns_everything() {
        let mut fx = Fixture::new();
        let buy = fx.add(Direction::Buy, 90, 2);
        let sell = fx.add(Direction::Sell, 110, 2);
        let clearing = fx.clear(&NoPool);
        assert_eq!(clearing.failures.len(), 1);

        let mut executor = SettlementExecutor::new(&ProtocolConfig::default());
        let report = executor
            .settle(&mut fx.ledger, &fx.supply, &NoPool, &clearing, &fx.orders, &fx.commitments)
            .unwrap();
        assert!(report.orders.iter().all(|o| o.outcome == OrderOutcome::Unmatched));
        assert_eq!(balance(&fx.ledger, &buy, "USDC"), (Decimal::new(180, 0), Decimal::ZERO));
        assert_eq!(balance(&fx.ledger, &sell, "ETH"), (Decimal::new(2, 0), Decimal::ZERO));
        assert!(report.fees.is_empty());
    }

    #[test]
    fn pool_fill_uses_pool_inventory() {
        let mut fx = Fixture::new();
        let pair_pool = Account::Pool(fairbatch_types::TradingPair::new("ETH", "USDC"));
        fx.deposit(&pair_pool, "ETH", Decimal::new(1_000, 0));
        let buy = fx.add(Direction::Buy, 105, 5);

        let pool = StaticPool::new(Decimal::new(100, 0), Decimal::new(1_000, 0));
        let clearing = fx.clear(&pool);

        let mut executor = SettlementExecutor::new(&ProtocolConfig::default());
        executor
            .settle(&mut fx.ledger, &fx.supply, &pool, &clearing, &fx.orders, &fx.commitments)
            .unwrap();

        // 5 ETH at 100, fee 0.0025 ETH; 25 USDC of headroom returned.
        assert_eq!(
            balance(&fx.ledger, &buy, "ETH"),
            (Decimal::new(49_975, 4), Decimal::ZERO)
        );
        assert_eq!(
            balance(&fx.ledger, &buy, "USDC"),
            (Decimal::new(25, 0), Decimal::ZERO)
        );
        assert_eq!(fx.ledger.balance(&pair_pool, "USDC").available, Decimal::new(500, 0));
        assert_eq!(pool.applied().len(), 1);
        fx.supply.verify_ledger(&fx.ledger).unwrap();
    }

    #[test]
    fn unfunded_pool_leaves_ledger_untouched() {
        let mut fx = Fixture::new();
        let buy = fx.add(Direction::Buy, 105, 5);
        let pool = StaticPool::new(Decimal::new(100, 0), Decimal::new(1_000, 0));
        let clearing = fx.clear(&pool);

        let mut executor = SettlementExecutor::new(&ProtocolConfig::default());
        let err = executor
            .settle(&mut fx.ledger, &fx.supply, &pool, &clearing, &fx.orders, &fx.commitments)
            .unwrap_err();
        assert!(matches!(err, FairbatchError::SettlementFailure { .. }));
        assert_eq!(
            balance(&fx.ledger, &buy, "USDC"),
            (Decimal::ZERO, Decimal::new(525, 0))
        );
        assert!(!executor.is_settled(BatchId(1)));
        assert!(pool.applied().is_empty());
    }

    #[test]
    fn missing_commitment_fails() {
        let mut fx = Fixture::new();
        fx.add(Direction::Buy, 100, 1);
        fx.add(Direction::Sell, 100, 1);
        fx.commitments.pop();
        let clearing = fx.clear(&NoPool);
        let err = plan_settlement(&clearing, &fx.orders, &fx.commitments, 5).unwrap_err();
        assert!(matches!(err, FairbatchError::SettlementFailure { .. }));
    }

    #[test]
    fn priority_payments_reported_per_quote_asset() {
        let mut fx = Fixture::new();
        let mut bidder = fx.add(Direction::Buy, 100, 1);
        bidder.fields.priority_bid = Decimal::new(3, 0);
        fx.orders[0] = bidder;
        fx.add(Direction::Sell, 100, 1);
        let clearing = fx.clear(&NoPool);
        let plan = plan_settlement(&clearing, &fx.orders, &fx.commitments, 5).unwrap();
        assert_eq!(plan.priority_payments.get("USDC"), Some(&Decimal::new(3, 0)));
    }
}

//! Uniform clearing price computation for one trading pair.
//!
//! Candidate prices are the distinct limit prices present in the batch. For
//! each candidate `p`:
//!
//! ```text
//!   demand(p)  = Σ executable(buy)   where buy.limit  >= p
//!   supply(p)  = Σ executable(sell)  where sell.limit <= p
//!   matched(p) = min(demand(p), supply(p))
//! ```
//!
//! The chosen price maximizes, in order:
//! 1. matched volume
//! 2. balance (smallest `|demand - supply|`)
//! 3. `demand >= supply`
//! 4. price
//!
//! Every eligible order executes at that one price. The short side fills in
//! full; the long side is rationed in execution-sequence order, so at most
//! one order is partially filled.
//!
//! `executable(o)` is the order's amount, capped at
//! `liquidity × max_trade_size_bps` when the pricing provider reports pool
//! depth. The cap applies before the curves are built.
//!
//! When nothing crosses, the pool is asked to quote the larger side's
//! volume; orders on that side whose limit accepts the quote fill against
//! the pool. Otherwise the pair fails with `InsufficientLiquidity`.

use std::collections::BTreeSet;

use fairbatch_types::amount::bps_of;
use fairbatch_types::{
    Counterparty, Direction, FairbatchError, Fill, Order, PairClearing, PricingProvider, Result,
    TradingPair,
};
use rust_decimal::Decimal;

/// Aggregate curve values at one candidate price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint {
    pub price: Decimal,
    pub demand: Decimal,
    pub supply: Decimal,
}

impl CurvePoint {
    #[must_use]
    pub fn matched(&self) -> Decimal {
        self.demand.min(self.supply)
    }

    #[must_use]
    pub fn imbalance(&self) -> Decimal {
        (self.demand - self.supply).abs()
    }

    /// Ordering key: larger is better.
    fn rank(&self) -> (Decimal, Decimal, bool, Decimal) {
        (
            self.matched(),
            -self.imbalance(),
            self.demand >= self.supply,
            self.price,
        )
    }
}

/// Per-order ceiling implied by the provider's reported liquidity.
#[must_use]
pub fn trade_size_cap(
    pricing: &dyn PricingProvider,
    pair: &TradingPair,
    max_trade_size_bps: u32,
) -> Option<Decimal> {
    pricing
        .liquidity(pair)
        .map(|liquidity| bps_of(liquidity, max_trade_size_bps))
}

fn executable(order: &Order, cap: Option<Decimal>) -> Decimal {
    cap.map_or(order.fields.amount, |c| order.fields.amount.min(c))
}

/// Demand/supply at every candidate price, ascending by price.
#[must_use]
pub fn build_curves(orders: &[Order], cap: Option<Decimal>) -> Vec<CurvePoint> {
    let candidates: BTreeSet<Decimal> = orders
        .iter()
        .map(|o| o.fields.limit_price.normalize())
        .collect();

    candidates
        .into_iter()
        .map(|price| {
            let mut demand = Decimal::ZERO;
            let mut supply = Decimal::ZERO;
            for o in orders.iter().filter(|o| o.accepts(price)) {
                match o.direction() {
                    Direction::Buy => demand += executable(o, cap),
                    Direction::Sell => supply += executable(o, cap),
                }
            }
            CurvePoint {
                price,
                demand,
                supply,
            }
        })
        .collect()
}

/// Pick the clearing point, if any price matches volume.
#[must_use]
pub fn select_clearing_point(curve: &[CurvePoint]) -> Option<CurvePoint> {
    curve
        .iter()
        .copied()
        .filter(|p| p.matched() > Decimal::ZERO)
        .max_by_key(CurvePoint::rank)
}

/// Clear one pair.
///
/// `orders` must be in execution sequence; orders of other pairs are ignored.
///
/// # Errors
/// `InsufficientLiquidity` if neither batch flow nor the pool can fill.
pub fn compute_clearing_price(
    orders: &[Order],
    pair: &TradingPair,
    pricing: &dyn PricingProvider,
    max_trade_size_bps: u32,
) -> Result<PairClearing> {
    let pair_orders: Vec<Order> = orders
        .iter()
        .filter(|o| o.pair() == pair)
        .cloned()
        .collect();
    let cap = trade_size_cap(pricing, pair, max_trade_size_bps);

    let curve = build_curves(&pair_orders, cap);
    if let Some(point) = select_clearing_point(&curve) {
        return Ok(cross_batch(&pair_orders, pair, point, cap));
    }
    fill_against_pool(&pair_orders, pair, pricing, cap)
}

fn cross_batch(
    orders: &[Order],
    pair: &TradingPair,
    point: CurvePoint,
    cap: Option<Decimal>,
) -> PairClearing {
    let price = point.price;
    let matched = point.matched();
    let mut buy_left = matched;
    let mut sell_left = matched;

    let mut fills = Vec::new();
    let mut unmatched = Vec::new();
    for order in orders {
        let amount = if order.accepts(price) {
            let remaining = match order.direction() {
                Direction::Buy => &mut buy_left,
                Direction::Sell => &mut sell_left,
            };
            let fill = executable(order, cap).min(*remaining);
            *remaining -= fill;
            fill
        } else {
            Decimal::ZERO
        };

        if amount.is_zero() {
            unmatched.push(order.id);
        } else {
            fills.push(Fill {
                order_id: order.id,
                participant: order.participant,
                pair: pair.clone(),
                direction: order.direction(),
                amount,
                price,
                counterparty: Counterparty::Batch,
            });
        }
    }

    tracing::debug!(
        pair = %pair,
        clearing_price = %price,
        matched = %matched,
        demand = %point.demand,
        supply = %point.supply,
        fills = fills.len(),
        unmatched = unmatched.len(),
        "pair cleared"
    );

    PairClearing {
        pair: pair.clone(),
        clearing_price: price,
        matched_volume: matched,
        fills,
        unmatched,
    }
}

fn fill_against_pool(
    orders: &[Order],
    pair: &TradingPair,
    pricing: &dyn PricingProvider,
    cap: Option<Decimal>,
) -> Result<PairClearing> {
    let side_volume = |d: Direction| -> Decimal {
        orders
            .iter()
            .filter(|o| o.direction() == d)
            .map(|o| executable(o, cap))
            .sum()
    };
    let (buys, sells) = (side_volume(Direction::Buy), side_volume(Direction::Sell));
    let (direction, volume) = if buys >= sells {
        (Direction::Buy, buys)
    } else {
        (Direction::Sell, sells)
    };

    let Some(quote) = (volume > Decimal::ZERO)
        .then(|| pricing.quote(pair, direction, volume))
        .flatten()
    else {
        tracing::debug!(pair = %pair, %buys, %sells, "no crossing and no pool quote");
        return Err(FairbatchError::InsufficientLiquidity(pair.clone()));
    };

    let mut fills = Vec::new();
    let mut unmatched = Vec::new();
    for order in orders {
        let amount = if order.direction() == direction && order.accepts(quote) {
            executable(order, cap)
        } else {
            Decimal::ZERO
        };
        if amount.is_zero() {
            unmatched.push(order.id);
        } else {
            fills.push(Fill {
                order_id: order.id,
                participant: order.participant,
                pair: pair.clone(),
                direction,
                amount,
                price: quote,
                counterparty: Counterparty::Pool,
            });
        }
    }

    if fills.is_empty() {
        tracing::debug!(pair = %pair, %quote, "pool quote accepted by no order");
        return Err(FairbatchError::InsufficientLiquidity(pair.clone()));
    }

    let matched: Decimal = fills.iter().map(|f| f.amount).sum();
    tracing::debug!(
        pair = %pair,
        %direction,
        clearing_price = %quote,
        matched = %matched,
        "pair filled against pool"
    );
    Ok(PairClearing {
        pair: pair.clone(),
        clearing_price: quote,
        matched_volume: matched,
        fills,
        unmatched,
    })
}

#[cfg(test)]
mod tests {
    use fairbatch_types::{NoPool, ParticipantId, StaticPool};

    use super::*;

    fn pair() -> TradingPair {
        TradingPair::new("ETH", "USDC")
    }

    fn order(seq: u64, direction: Direction, limit: i64, amount: i64) -> Order {
        Order::dummy_for(
            ParticipantId::new(),
            direction,
            Decimal::new(limit, 0),
            Decimal::new(amount, 0),
            seq,
        )
    }

    fn filled(result: &PairClearing, order: &Order) -> Decimal {
        result
            .fills
            .iter()
            .find(|f| f.order_id == order.id)
            .map_or(Decimal::ZERO, |f| f.amount)
    }

    #[test]
    fn eighty_buy_twenty_sell_at_one_limit() {
        let buy = order(0, Direction::Buy, 100, 80);
        let sell = order(1, Direction::Sell, 100, 20);
        let result =
            compute_clearing_price(&[buy.clone(), sell.clone()], &pair(), &NoPool, 1_000).unwrap();

        assert_eq!(result.clearing_price, Decimal::new(100, 0));
        assert_eq!(result.matched_volume, Decimal::new(20, 0));
        assert_eq!(filled(&result, &buy), Decimal::new(20, 0));
        assert_eq!(filled(&result, &sell), Decimal::new(20, 0));
        // 60 of the buy is left for settlement to return.
        assert_eq!(buy.fields.amount - filled(&result, &buy), Decimal::new(60, 0));
    }

    #[test]
    fn all_fills_share_one_price() {
        let orders = vec![
            order(0, Direction::Buy, 105, 3),
            order(1, Direction::Buy, 102, 2),
            order(2, Direction::Buy, 99, 4),
            order(3, Direction::Sell, 98, 2),
            order(4, Direction::Sell, 101, 3),
            order(5, Direction::Sell, 104, 5),
        ];
        let result = compute_clearing_price(&orders, &pair(), &NoPool, 1_000).unwrap();
        assert!(result.fills.iter().all(|f| f.price == result.clearing_price));
        let bought: Decimal = result
            .fills
            .iter()
            .filter(|f| f.direction == Direction::Buy)
            .map(|f| f.amount)
            .sum();
        let sold: Decimal = result
            .fills
            .iter()
            .filter(|f| f.direction == Direction::Sell)
            .map(|f| f.amount)
            .sum();
        assert_eq!(bought, sold);
        assert_eq!(bought, result.matched_volume);
    }

    #[test]
    fn tie_break_prefers_balance_then_price() {
        // Candidates 100 and 101 both match 5; at 101 demand == supply.
        let orders = vec![
            order(0, Direction::Buy, 101, 5),
            order(1, Direction::Sell, 100, 5),
            order(2, Direction::Sell, 101, 2),
        ];
        let curve = build_curves(&orders, None);
        assert_eq!(curve.len(), 2);
        let point = select_clearing_point(&curve).unwrap();
        // p=100: demand 5, supply 5. p=101: demand 5, supply 7.
        assert_eq!(point.price, Decimal::new(100, 0));

        // Exact crossing at two prices: the larger price wins.
        let orders = vec![
            order(0, Direction::Buy, 110, 5),
            order(1, Direction::Sell, 100, 5),
        ];
        let point = select_clearing_point(&build_curves(&orders, None)).unwrap();
        assert_eq!(point.price, Decimal::new(110, 0));
    }

    #[test]
    fn long_side_rationed_in_sequence_order() {
        let a = order(0, Direction::Buy, 100, 5);
        let b = order(1, Direction::Buy, 100, 5);
        let c = order(2, Direction::Buy, 100, 5);
        let s = order(3, Direction::Sell, 100, 7);
        let result = compute_clearing_price(
            &[a.clone(), b.clone(), c.clone(), s.clone()],
            &pair(),
            &NoPool,
            1_000,
        )
        .unwrap();
        assert_eq!(filled(&result, &a), Decimal::new(5, 0));
        assert_eq!(filled(&result, &b), Decimal::new(2, 0));
        assert_eq!(filled(&result, &c), Decimal::ZERO);
        assert_eq!(filled(&result, &s), Decimal::new(7, 0));
        assert_eq!(result.unmatched, vec![c.id]);
    }

    #[test]
    fn orders_outside_limit_unmatched() {
        let cheap_buy = order(0, Direction::Buy, 90, 5);
        let buy = order(1, Direction::Buy, 100, 5);
        let sell = order(2, Direction::Sell, 100, 5);
        let result = compute_clearing_price(
            &[cheap_buy.clone(), buy, sell],
            &pair(),
            &NoPool,
            1_000,
        )
        .unwrap();
        assert!(result.unmatched.contains(&cheap_buy.id));
    }

    #[test]
    fn no_crossing_without_pool_fails() {
        let orders = vec![
            order(0, Direction::Buy, 99, 1),
            order(1, Direction::Sell, 101, 1),
        ];
        let err = compute_clearing_price(&orders, &pair(), &NoPool, 1_000).unwrap_err();
        assert!(matches!(err, FairbatchError::InsufficientLiquidity(_)));
    }

    #[test]
    fn one_sided_flow_fills_against_pool() {
        let pool = StaticPool::new(Decimal::new(100, 0), Decimal::new(1_000, 0));
        let eager = order(0, Direction::Buy, 105, 5);
        let stingy = order(1, Direction::Buy, 95, 5);
        let result = compute_clearing_price(
            &[eager.clone(), stingy.clone()],
            &pair(),
            &pool,
            1_000,
        )
        .unwrap();
        assert_eq!(result.clearing_price, Decimal::new(100, 0));
        assert_eq!(filled(&result, &eager), Decimal::new(5, 0));
        assert_eq!(result.unmatched, vec![stingy.id]);
        assert!(result.fills.iter().all(|f| f.counterparty == Counterparty::Pool));
    }

    #[test]
    fn pool_quote_rejected_by_every_order_fails() {
        let pool = StaticPool::new(Decimal::new(200, 0), Decimal::new(1_000, 0));
        let orders = vec![order(0, Direction::Buy, 105, 5)];
        let err = compute_clearing_price(&orders, &pair(), &pool, 1_000).unwrap_err();
        assert!(matches!(err, FairbatchError::InsufficientLiquidity(_)));
    }

    #[test]
    fn trade_size_cap_applies_before_curves() {
        // Liquidity 100 at 10% → each order executes at most 10.
        let pool = StaticPool::new(Decimal::new(100, 0), Decimal::new(100, 0));
        let buy = order(0, Direction::Buy, 100, 50);
        let sell = order(1, Direction::Sell, 100, 50);
        let result =
            compute_clearing_price(&[buy.clone(), sell.clone()], &pair(), &pool, 1_000).unwrap();
        assert_eq!(result.matched_volume, Decimal::new(10, 0));
        assert_eq!(filled(&result, &buy), Decimal::new(10, 0));
        assert_eq!(filled(&result, &sell), Decimal::new(10, 0));
    }

    #[test]
    fn other_pairs_ignored() {
        let mut foreign = order(0, Direction::Buy, 100, 5);
        foreign.fields.pair = TradingPair::new("BTC", "USDC");
        let buy = order(1, Direction::Buy, 100, 5);
        let sell = order(2, Direction::Sell, 100, 5);
        let result =
            compute_clearing_price(&[foreign.clone(), buy, sell], &pair(), &NoPool, 1_000).unwrap();
        assert!(result.fills.iter().all(|f| f.order_id != foreign.id));
        assert!(!result.unmatched.contains(&foreign.id));
    }
}

//! Settlement records.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, BatchId, CommitmentId, Digest, Direction, ParticipantId, TradingPair, Transfer};

/// How an order ended up after clearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderOutcome {
    Filled,
    PartiallyFilled,
    Unmatched,
}

labels!(OrderOutcome {
    Filled => "FILLED",
    PartiallyFilled => "PARTIALLY_FILLED",
    Unmatched => "UNMATCHED",
});

/// Per-order settlement line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettlement {
    pub order_id: CommitmentId,
    pub participant: ParticipantId,
    pub pair: TradingPair,
    pub direction: Direction,
    pub outcome: OrderOutcome,
    /// Base amount the order asked for.
    pub requested: Decimal,
    /// Executed base amount.
    pub filled: Decimal,
    /// Quote value of the executed amount.
    pub notional: Decimal,
    /// Collateral consumed by the fill (input asset).
    pub input_consumed: Decimal,
    /// Output credited to custody, after fee.
    pub received: Decimal,
    /// Fee withheld from the output.
    pub fee: Decimal,
    /// Collateral returned to custody (input asset).
    pub returned: Decimal,
}

/// Everything the settlement stage did for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub batch_id: BatchId,
    pub orders: Vec<OrderSettlement>,
    /// Ledger transfers applied, in order, as one atomic unit.
    pub transfers: Vec<Transfer>,
    /// Trading fees collected into `Proceeds(batch)`, per asset.
    pub fees: BTreeMap<Asset, Decimal>,
    /// Priority bids collected into `Proceeds(batch)`, per asset.
    pub priority_payments: BTreeMap<Asset, Decimal>,
    pub fill_root: Digest,
}

impl SettlementReport {
    /// Fees plus priority payments for one asset.
    #[must_use]
    pub fn proceeds(&self, asset: &str) -> Decimal {
        self.fees.get(asset).copied().unwrap_or_default()
            + self.priority_payments.get(asset).copied().unwrap_or_default()
    }

    /// Every asset with collected proceeds, sorted.
    #[must_use]
    pub fn proceeds_assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self
            .fees
            .keys()
            .chain(self.priority_payments.keys())
            .cloned()
            .collect();
        assets.sort();
        assets.dedup();
        assets
    }

    #[must_use]
    pub fn order(&self, order_id: CommitmentId) -> Option<&OrderSettlement> {
        self.orders.iter().find(|o| o.order_id == order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proceeds_merge_fees_and_bids() {
        let report = SettlementReport {
            batch_id: BatchId(1),
            orders: vec![],
            transfers: vec![],
            fees: BTreeMap::from([
                ("USDC".to_string(), Decimal::new(3, 0)),
                ("ETH".to_string(), Decimal::new(1, 2)),
            ]),
            priority_payments: BTreeMap::from([("USDC".to_string(), Decimal::new(10, 0))]),
            fill_root: Digest([0u8; 32]),
        };
        assert_eq!(report.proceeds("USDC"), Decimal::new(13, 0));
        assert_eq!(report.proceeds("ETH"), Decimal::new(1, 2));
        assert_eq!(report.proceeds("BTC"), Decimal::ZERO);
        assert_eq!(report.proceeds_assets(), vec!["ETH".to_string(), "USDC".to_string()]);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(format!("{}", OrderOutcome::PartiallyFilled), "PARTIALLY_FILLED");
    }
}

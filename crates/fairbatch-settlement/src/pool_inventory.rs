//! Pool inventory bound on pricing.
//!
//! A pool fill is paid out of `Pool(pair)` on the escrow ledger, not out of
//! the pricing collaborator. [`InventoryBoundPricing`] wraps the collaborator
//! for the clearing stage and withholds any quote the pool account could not
//! pay in full, so the pair fails with `InsufficientLiquidity` and every order
//! is returned instead of settlement being rejected later.
//!
//! ```text
//!   buy  flow of q base at p  ──► pool pays q       base
//!   sell flow of q base at p  ──► pool pays q × p   quote
//! ```

use fairbatch_ingress::EscrowLedger;
use fairbatch_types::{Account, Direction, PricingProvider, Result, TradingPair};
use rust_decimal::Decimal;

/// Pricing collaborator limited by the pool's ledger inventory.
pub struct InventoryBoundPricing<'a> {
    inner: &'a dyn PricingProvider,
    ledger: &'a EscrowLedger,
}

impl<'a> InventoryBoundPricing<'a> {
    #[must_use]
    pub fn new(inner: &'a dyn PricingProvider, ledger: &'a EscrowLedger) -> Self {
        Self { inner, ledger }
    }

    /// Output the pool must pay for `amount` base units of flow at `price`.
    fn payout(direction: Direction, amount: Decimal, price: Decimal) -> Option<Decimal> {
        match direction {
            Direction::Buy => Some(amount),
            Direction::Sell => amount.checked_mul(price),
        }
    }
}

impl PricingProvider for InventoryBoundPricing<'_> {
    fn quote(&self, pair: &TradingPair, direction: Direction, amount: Decimal) -> Option<Decimal> {
        let price = self.inner.quote(pair, direction, amount)?;
        let asset = match direction {
            Direction::Buy => &pair.base,
            Direction::Sell => &pair.quote,
        };
        let inventory = self.ledger.balance(&Account::Pool(pair.clone()), asset).available;
        match Self::payout(direction, amount, price) {
            Some(needed) if needed <= inventory => Some(price),
            needed => {
                tracing::debug!(
                    pair = %pair,
                    %direction,
                    %amount,
                    %inventory,
                    needed = ?needed,
                    "pool inventory cannot cover quote"
                );
                None
            }
        }
    }

    fn liquidity(&self, pair: &TradingPair) -> Option<Decimal> {
        self.inner.liquidity(pair)
    }

    fn apply_trade(
        &self,
        pair: &TradingPair,
        direction: Direction,
        amount: Decimal,
        price: Decimal,
    ) -> Result<()> {
        self.inner.apply_trade(pair, direction, amount, price)
    }
}

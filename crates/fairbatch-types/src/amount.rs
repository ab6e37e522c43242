//! Fixed-precision amount arithmetic.
//!
//! Every division in the engine truncates toward zero to
//! [`AMOUNT_PRECISION`](crate::constants::AMOUNT_PRECISION) places; the
//! caller then assigns the residue explicitly so totals stay exact.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::constants::{AMOUNT_PRECISION, BPS_DENOMINATOR};

/// Truncate toward zero to the engine's amount precision.
#[must_use]
pub fn truncate(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_PRECISION, RoundingStrategy::ToZero)
}

/// `trunc(amount × bps / 10_000)`.
#[must_use]
pub fn bps_of(amount: Decimal, bps: u32) -> Decimal {
    truncate(amount * (Decimal::from(bps) / Decimal::from(BPS_DENOMINATOR)))
}

/// `trunc(total × part / whole)`, zero when `whole` is zero.
#[must_use]
pub fn pro_rata(total: Decimal, part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        // Ratio first when the product overflows.
        let share = total
            .checked_mul(part)
            .map_or_else(|| total * (part / whole), |scaled| scaled / whole);
        truncate(share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_rounds_toward_zero() {
        let third = Decimal::ONE / Decimal::from(3);
        assert_eq!(truncate(third), Decimal::new(33_333_333, 8));
        let two_thirds = Decimal::from(2) / Decimal::from(3);
        assert_eq!(truncate(two_thirds), Decimal::new(66_666_666, 8));
    }

    #[test]
    fn bps_of_half() {
        assert_eq!(bps_of(Decimal::new(100, 0), 5_000), Decimal::new(50, 0));
        assert_eq!(bps_of(Decimal::new(1, 8), 5_000), Decimal::ZERO);
        assert!(bps_of(Decimal::MAX, 10_000) <= Decimal::MAX);
    }

    #[test]
    fn pro_rata_handles_zero_whole() {
        assert_eq!(pro_rata(Decimal::TEN, Decimal::ONE, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(
            pro_rata(Decimal::TEN, Decimal::ONE, Decimal::from(3)),
            Decimal::new(333_333_333, 8)
        );
        let half = pro_rata(Decimal::MAX, Decimal::ONE, Decimal::TWO);
        assert!(half > Decimal::ZERO && half < Decimal::MAX);
    }
}

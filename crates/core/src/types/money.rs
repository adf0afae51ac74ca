//! Money arithmetic for carts and orders.
//!
//! All amounts are `Decimal` in the currency's standard unit (dollars, not
//! cents) and are rounded to two places, midpoint away from zero.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round an amount to whole cents.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount to minor units (cents) for payment gateways.
///
/// Returns `None` if the amount does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    let cents = round_cents(amount) * Decimal::ONE_HUNDRED;
    i64::try_from(cents.trunc()).ok()
}

/// Store-wide pricing rules for tax and shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    /// Tax rate applied to the subtotal (e.g. `0.08` for 8%).
    pub tax_rate: Decimal,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Shipping charged below the threshold.
    pub flat_shipping: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            free_shipping_threshold: Decimal::new(100, 0),
            flat_shipping: Decimal::new(10, 0),
        }
    }
}

/// A priced line contributing to a cart or order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    /// Price of one unit.
    pub unit_price: Decimal,
    /// Number of units.
    pub quantity: i32,
}

/// Derived totals of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CartTotals {
    /// Number of units across all lines.
    pub item_count: i64,
    /// Sum of line prices.
    pub subtotal: Decimal,
    /// Tax on the subtotal.
    pub tax: Decimal,
    /// Shipping charge.
    pub shipping: Decimal,
    /// Amount to pay.
    pub total: Decimal,
}

impl CartTotals {
    /// Compute totals for a set of lines under the given rules.
    ///
    /// An empty cart costs nothing, including shipping.
    #[must_use]
    pub fn compute<I>(lines: I, rules: &PricingRules) -> Self
    where
        I: IntoIterator<Item = CartLine>,
    {
        let (item_count, subtotal) =
            lines
                .into_iter()
                .fold((0_i64, Decimal::ZERO), |(count, sum), line| {
                    (
                        count + i64::from(line.quantity),
                        sum + line.unit_price * Decimal::from(line.quantity),
                    )
                });

        let subtotal = round_cents(subtotal);
        let tax = round_cents(subtotal * rules.tax_rate);
        let shipping = if subtotal.is_zero() || subtotal >= rules.free_shipping_threshold {
            Decimal::ZERO
        } else {
            rules.flat_shipping
        };

        Self {
            item_count,
            subtotal,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap_or_default()
    }

    fn line(price: &str, quantity: i32) -> CartLine {
        CartLine {
            unit_price: dec(price),
            quantity,
        }
    }

    #[test]
    fn test_empty_cart_is_free() {
        let totals = CartTotals::compute(Vec::new(), &PricingRules::default());
        assert_eq!(totals, CartTotals::default());
    }

    #[test]
    fn test_small_cart_pays_flat_shipping() {
        let totals = CartTotals::compute([line("19.99", 2)], &PricingRules::default());
        assert_eq!(totals.item_count, 2);
        assert_eq!(totals.subtotal, dec("39.98"));
        assert_eq!(totals.tax, dec("3.20"));
        assert_eq!(totals.shipping, dec("10"));
        assert_eq!(totals.total, dec("53.18"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let totals = CartTotals::compute([line("50.00", 2)], &PricingRules::default());
        assert_eq!(totals.subtotal, dec("100.00"));
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, dec("108.00"));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        let rules = PricingRules {
            tax_rate: dec("0.05"),
            ..PricingRules::default()
        };
        // 0.05 * 10.10 = 0.505 -> 0.51
        let totals = CartTotals::compute([line("10.10", 1)], &rules);
        assert_eq!(totals.tax, dec("0.51"));
    }

    #[test]
    fn test_multiple_lines_sum() {
        let totals = CartTotals::compute(
            [line("12.50", 1), line("7.25", 3), line("0.99", 4)],
            &PricingRules::default(),
        );
        assert_eq!(totals.item_count, 8);
        assert_eq!(totals.subtotal, dec("38.21"));
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(dec("53.18")), Some(5318));
        assert_eq!(to_minor_units(dec("0.005")), Some(1));
        assert_eq!(to_minor_units(Decimal::ZERO), Some(0));
    }
}

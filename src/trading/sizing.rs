//! Position sizing against exchange market limits.

use anyhow::{ensure, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::exchange::MarketRules;
use crate::utils::decimal::{round_down_to_step, round_up_to_step};

/// Notional targeted by one position: margin × leverage.
pub fn target_notional(margin: Decimal, leverage: u8) -> Decimal {
    margin * Decimal::from(leverage)
}

/// Cap a notional at a fraction of the available balance.
pub fn cap_notional(notional: Decimal, balance: Decimal, max_fraction: Decimal) -> Decimal {
    notional.min(balance * max_fraction)
}

/// Notional used for the single retry after a minimum-notional rejection.
///
/// BTC contracts carry a higher exchange minimum than the rest of the board.
pub fn retry_notional(notional: Decimal, increment: Decimal, base_asset: &str) -> Decimal {
    let floor = if base_asset.eq_ignore_ascii_case("BTC") {
        dec!(200)
    } else {
        dec!(100)
    };
    (notional + increment).max(floor)
}

/// Convert a notional into an order quantity that satisfies the symbol's
/// minimum quantity, minimum notional and step size.
///
/// Quantities are floored to the step, or ceiled when flooring would drop
/// below a minimum.
pub fn size_quantity(notional: Decimal, price: Decimal, rules: &MarketRules) -> Result<Decimal> {
    ensure!(price > Decimal::ZERO, "Could not fetch price");

    let raw = notional / price;
    ensure!(
        raw > Decimal::ZERO,
        "Invalid quantity calculated: {} (notional: {}, price: {})",
        raw,
        notional,
        price
    );

    let mut quantity = raw.max(rules.min_qty);
    if quantity * price < rules.min_notional {
        quantity = rules.min_notional / price;
    }

    let mut rounded = round_down_to_step(quantity, rules.step_size);
    if rounded < rules.min_qty || rounded * price < rules.min_notional {
        rounded = round_up_to_step(quantity, rules.step_size);
    }

    ensure!(
        rounded > Decimal::ZERO,
        "Invalid quantity after adjustment: {}",
        rounded
    );

    Ok(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doge_rules() -> MarketRules {
        MarketRules {
            min_qty: dec!(1),
            step_size: dec!(1),
            min_notional: dec!(5),
            tick_size: dec!(0.00001),
        }
    }

    #[test]
    fn test_notional_is_margin_times_leverage() {
        assert_eq!(target_notional(dec!(3), 50), dec!(150));
        assert_eq!(target_notional(dec!(2.5), 1), dec!(2.5));
    }

    #[test]
    fn test_quantity_before_limits() {
        let rules = MarketRules::default();
        let quantity = size_quantity(target_notional(dec!(3), 50), dec!(2.0), &rules).unwrap();
        assert_eq!(quantity, dec!(75));
    }

    #[test]
    fn test_balance_cap() {
        assert_eq!(cap_notional(dec!(150), dec!(1000), dec!(0.5)), dec!(150));
        assert_eq!(cap_notional(dec!(150), dec!(100), dec!(0.5)), dec!(50));
    }

    #[test]
    fn test_raised_to_min_notional() {
        // 1 USDT at 0.3 is 3.33 DOGE, below the 5 USDT minimum
        let quantity = size_quantity(dec!(1), dec!(0.3), &doge_rules()).unwrap();
        assert_eq!(quantity, dec!(17));
        assert!(quantity * dec!(0.3) >= dec!(5));
    }

    #[test]
    fn test_raised_to_min_quantity() {
        let rules = MarketRules {
            min_qty: dec!(0.001),
            step_size: dec!(0.001),
            min_notional: Decimal::ZERO,
            tick_size: dec!(0.1),
        };
        let quantity = size_quantity(dec!(5), dec!(60000), &rules).unwrap();
        assert_eq!(quantity, dec!(0.001));
    }

    #[test]
    fn test_floored_to_step() {
        let quantity = size_quantity(dec!(150), dec!(0.3), &doge_rules()).unwrap();
        assert_eq!(quantity, dec!(500));

        let quantity = size_quantity(dec!(150), dec!(0.7), &doge_rules()).unwrap();
        assert_eq!(quantity, dec!(214));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(size_quantity(dec!(150), Decimal::ZERO, &doge_rules()).is_err());
        assert!(size_quantity(Decimal::ZERO, dec!(2), &doge_rules()).is_err());
        assert!(size_quantity(dec!(-10), dec!(2), &doge_rules()).is_err());
    }

    #[test]
    fn test_retry_notional() {
        assert_eq!(retry_notional(dec!(150), dec!(50), "ETH"), dec!(200));
        assert_eq!(retry_notional(dec!(20), dec!(50), "DOGE"), dec!(100));
        assert_eq!(retry_notional(dec!(20), dec!(50), "BTC"), dec!(200));
    }
}

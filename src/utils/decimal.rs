//! Decimal arithmetic utilities for order sizing.

use rust_decimal::Decimal;

/// Round to tick size (e.g., 0.01 for most prices).
pub fn round_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size == Decimal::ZERO {
        return value;
    }
    ((value / tick_size).round() * tick_size).normalize()
}

/// Round down to a quantity step.
pub fn round_down_to_step(value: Decimal, step_size: Decimal) -> Decimal {
    if step_size == Decimal::ZERO {
        return value;
    }
    ((value / step_size).floor() * step_size).normalize()
}

/// Round up to a quantity step.
pub fn round_up_to_step(value: Decimal, step_size: Decimal) -> Decimal {
    if step_size == Decimal::ZERO {
        return value;
    }
    ((value / step_size).ceil() * step_size).normalize()
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

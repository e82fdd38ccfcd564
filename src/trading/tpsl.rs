//! Take-profit / stop-loss trigger prices.
//!
//! Targets are expressed as a percentage of the margin actually committed,
//! so a 50% take profit on 3 USDT of margin closes the position once it is
//! 1.5 USDT in profit. The price move is that P&L divided by the quantity.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::exchange::{ConditionalOrder, OrderType, PositionSide};
use crate::utils::decimal::{round_to_tick, safe_div};

/// Trigger prices for one position. `None` means the order is not placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerPrices {
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

impl TriggerPrices {
    /// Derive trigger prices for a freshly opened position.
    ///
    /// Triggers that would land at or below zero are dropped.
    pub fn derive(
        side: PositionSide,
        entry_price: Decimal,
        quantity: Decimal,
        margin: Decimal,
        take_profit_percent: Option<Decimal>,
        stop_loss_percent: Option<Decimal>,
        tick_size: Decimal,
    ) -> Self {
        let direction = match side {
            PositionSide::Short => dec!(-1),
            _ => dec!(1),
        };

        let take_profit = take_profit_percent.map(|percent| {
            let profit_target = margin * (Decimal::ONE + percent / dec!(100));
            let delta = safe_div(profit_target - margin, quantity);
            entry_price + direction * delta
        });

        let stop_loss = stop_loss_percent.map(|percent| {
            let loss_limit = margin * (Decimal::ONE - percent / dec!(100));
            let delta = safe_div(margin - loss_limit, quantity);
            entry_price - direction * delta
        });

        let valid = |price: Decimal| {
            let rounded = round_to_tick(price, tick_size);
            (rounded > Decimal::ZERO).then_some(rounded)
        };

        Self {
            take_profit: take_profit.and_then(valid),
            stop_loss: stop_loss.and_then(valid),
        }
    }

    /// Close-position conditional orders for these triggers.
    pub fn orders(&self, symbol: &str, side: PositionSide) -> Vec<ConditionalOrder> {
        let close = |order_type, trigger_price| ConditionalOrder {
            symbol: symbol.to_string(),
            side: side.closing_side(),
            position_side: side,
            order_type,
            trigger_price,
            close_position: true,
        };

        self.take_profit
            .map(|price| close(OrderType::TakeProfitMarket, price))
            .into_iter()
            .chain(self.stop_loss.map(|price| close(OrderType::StopMarket, price)))
            .collect()
    }
}

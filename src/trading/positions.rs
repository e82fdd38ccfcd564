//! Open positions joined with their take-profit / stop-loss triggers.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::exchange::{asset_balance, AlgoOrder, FuturesExchange, OrderType, Position, PositionSide};
use crate::utils::decimal::safe_div;

/// Dashboard view of one open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub mark_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl: Decimal,
    pub side: PositionSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub leverage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub position_notional: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub margin: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub take_profit_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub stop_loss_price: Option<Decimal>,
}

/// Positions plus the USDT wallet balance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsSnapshot {
    pub positions: Vec<PositionView>,
    #[serde(with = "rust_decimal::serde::float")]
    pub wallet_balance: Decimal,
}

/// Reads positions and their trigger orders from the exchange.
pub struct PositionReader {
    exchange: Arc<dyn FuturesExchange>,
}

impl PositionReader {
    pub fn new(exchange: Arc<dyn FuturesExchange>) -> Self {
        Self { exchange }
    }

    /// Fetch a snapshot. Trigger orders are best effort.
    pub async fn snapshot(&self) -> Result<PositionsSnapshot> {
        let positions = self
            .exchange
            .positions()
            .await
            .context("Failed to fetch positions")?;
        let balances = self
            .exchange
            .account_balance()
            .await
            .context("Failed to fetch balance")?;

        let triggers = match self.exchange.open_conditional_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Failed to fetch open algo orders, omitting TP/SL");
                Vec::new()
            }
        };

        let views: Vec<PositionView> = positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| position_view(p, &triggers))
            .collect();
        let wallet_balance = asset_balance(&balances, "USDT")
            .map(|b| b.balance)
            .unwrap_or_default();

        debug!(positions = views.len(), %wallet_balance, "Positions snapshot");

        Ok(PositionsSnapshot {
            positions: views,
            wallet_balance,
        })
    }
}

fn position_view(position: &Position, triggers: &[AlgoOrder]) -> PositionView {
    let size = position.position_amt.abs();
    let side = position.direction();
    let notional = position.notional.abs();
    let initial_margin = position
        .initial_margin
        .filter(|m| *m > Decimal::ZERO);

    let leverage = match initial_margin {
        Some(margin) if !notional.is_zero() => notional / margin,
        _ => Decimal::ONE,
    };
    let position_notional = size * position.entry_price;
    let margin = initial_margin.unwrap_or_else(|| safe_div(position_notional, leverage));

    let trigger_for = |order_type: OrderType| {
        triggers
            .iter()
            .filter(|o| {
                o.symbol == position.symbol && o.position_side == side && o.order_type == order_type
            })
            .find_map(AlgoOrder::trigger)
    };

    PositionView {
        symbol: position.symbol.clone(),
        size,
        entry_price: position.entry_price,
        mark_price: position.mark_price,
        pnl: position.unrealized_profit,
        side,
        leverage,
        position_notional,
        margin,
        take_profit_price: trigger_for(OrderType::TakeProfitMarket),
        stop_loss_price: trigger_for(OrderType::StopMarket),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ConditionalOrder, MockExchange};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_snapshot_joins_triggers() {
        let exchange = Arc::new(MockExchange::new(dec!(500)));
        exchange.set_price("ETHUSDT", dec!(2900)).await;
        exchange.set_price("DOGEUSDT", dec!(0.2)).await;
        exchange
            .open_position("ETHUSDT", PositionSide::Short, dec!(0.5), dec!(3000), 20)
            .await;
        exchange
            .open_position("DOGEUSDT", PositionSide::Long, dec!(100), dec!(0.2), 10)
            .await;
        for (order_type, trigger) in [
            (OrderType::TakeProfitMarket, dec!(2800)),
            (OrderType::StopMarket, dec!(3100)),
        ] {
            exchange
                .place_conditional_order(&ConditionalOrder {
                    symbol: "ETHUSDT".to_string(),
                    side: PositionSide::Short.closing_side(),
                    position_side: PositionSide::Short,
                    order_type,
                    trigger_price: trigger,
                    close_position: true,
                })
                .await
                .unwrap();
        }

        let snapshot = PositionReader::new(exchange).snapshot().await.unwrap();
        assert_eq!(snapshot.wallet_balance, dec!(500));
        assert_eq!(snapshot.positions.len(), 2);

        let eth = snapshot.positions.iter().find(|p| p.symbol == "ETHUSDT").unwrap();
        assert_eq!(eth.side, PositionSide::Short);
        assert_eq!(eth.size, dec!(0.5));
        assert_eq!(eth.position_notional, dec!(1500));
        assert_eq!(eth.leverage, dec!(20));
        assert_eq!(eth.margin, dec!(72.5));
        assert_eq!(eth.pnl, dec!(50));
        assert_eq!(eth.take_profit_price, Some(dec!(2800)));
        assert_eq!(eth.stop_loss_price, Some(dec!(3100)));

        let doge = snapshot.positions.iter().find(|p| p.symbol == "DOGEUSDT").unwrap();
        assert_eq!(doge.take_profit_price, None);
        assert_eq!(doge.stop_loss_price, None);
    }

    #[test]
    fn test_missing_margin_falls_back() {
        let position = Position {
            symbol: "BTCUSDT".to_string(),
            position_side: PositionSide::Long,
            position_amt: dec!(0.01),
            entry_price: dec!(60000),
            mark_price: dec!(61000),
            unrealized_profit: dec!(10),
            liquidation_price: None,
            notional: dec!(610),
            initial_margin: None,
        };

        let view = position_view(&position, &[]);
        assert_eq!(view.leverage, Decimal::ONE);
        assert_eq!(view.margin, dec!(600));
    }

    #[test]
    fn test_serialized_shape() {
        let view = PositionView {
            symbol: "BTCUSDT".to_string(),
            size: dec!(0.01),
            entry_price: dec!(60000),
            mark_price: dec!(61000),
            pnl: dec!(10),
            side: PositionSide::Long,
            leverage: dec!(50),
            position_notional: dec!(600),
            margin: dec!(12.2),
            take_profit_price: Some(dec!(61200)),
            stop_loss_price: None,
        };

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["side"], "LONG");
        assert_eq!(value["entryPrice"], serde_json::json!(60000.0));
        assert_eq!(value["takeProfitPrice"], serde_json::json!(61200.0));
        assert!(value["stopLossPrice"].is_null());
    }
}

//! Type definitions for Binance USDT-M futures API requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange information for futures.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesExchangeInfo {
    pub symbols: Vec<FuturesSymbolInfo>,
}

/// Symbol information for futures.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesSymbolInfo {
    pub symbol: String,
    pub contract_type: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub quantity_precision: u32,
    #[serde(default)]
    pub price_precision: u32,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Trading rule filters attached to a symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFilter {
    #[serde(rename_all = "camelCase")]
    PriceFilter {
        #[serde(with = "rust_decimal::serde::str")]
        tick_size: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    LotSize {
        #[serde(with = "rust_decimal::serde::str")]
        min_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        max_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        step_size: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    MarketLotSize {
        #[serde(with = "rust_decimal::serde::str")]
        min_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        max_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        step_size: Decimal,
    },
    MinNotional {
        #[serde(with = "rust_decimal::serde::str")]
        notional: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Order sizing limits for one symbol, flattened from its filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketRules {
    /// Minimum order quantity
    pub min_qty: Decimal,
    /// Quantity increment
    pub step_size: Decimal,
    /// Minimum order value in quote currency
    pub min_notional: Decimal,
    /// Price increment
    pub tick_size: Decimal,
}

impl Default for MarketRules {
    /// Rules for a symbol with no exchange metadata: no minimums, 8dp.
    fn default() -> Self {
        Self {
            min_qty: Decimal::ZERO,
            step_size: Decimal::new(1, 8),
            min_notional: Decimal::ZERO,
            tick_size: Decimal::new(1, 8),
        }
    }
}

impl FuturesSymbolInfo {
    /// Whether this is a USDT-margined perpetual contract.
    pub fn is_usdt_perpetual(&self) -> bool {
        self.quote_asset == "USDT" && self.contract_type == "PERPETUAL"
    }

    /// Whether the contract is currently trading (not settling or delisted).
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }

    /// Flatten filters into sizing rules.
    ///
    /// Market orders are bounded by MARKET_LOT_SIZE when present, otherwise
    /// by LOT_SIZE. Missing filters fall back to the declared precisions.
    pub fn rules(&self) -> MarketRules {
        let mut rules = MarketRules {
            min_qty: Decimal::ZERO,
            step_size: Decimal::new(1, self.quantity_precision),
            min_notional: Decimal::ZERO,
            tick_size: Decimal::new(1, self.price_precision),
        };
        let mut has_market_lot = false;

        for filter in &self.filters {
            match filter {
                SymbolFilter::PriceFilter { tick_size } if *tick_size > Decimal::ZERO => {
                    rules.tick_size = *tick_size;
                }
                SymbolFilter::LotSize {
                    min_qty, step_size, ..
                } if !has_market_lot => {
                    rules.min_qty = *min_qty;
                    if *step_size > Decimal::ZERO {
                        rules.step_size = *step_size;
                    }
                }
                SymbolFilter::MarketLotSize {
                    min_qty, step_size, ..
                } if *step_size > Decimal::ZERO => {
                    has_market_lot = true;
                    rules.min_qty = *min_qty;
                    rules.step_size = *step_size;
                }
                SymbolFilter::MinNotional { notional } => {
                    rules.min_notional = *notional;
                }
                _ => {}
            }
        }

        rules
    }
}

/// 24-hour ticker statistics.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_change: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quote_volume: Decimal,
    #[serde(default)]
    pub close_time: i64,
}

/// Latest price for a symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPrice {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

/// Account balance information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(rename = "crossUnPnl", default, with = "rust_decimal::serde::str_option")]
    pub cross_unrealized_pnl: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_balance: Decimal,
}

/// Futures position information (positionRisk v3).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub position_side: PositionSide,
    #[serde(with = "rust_decimal::serde::str")]
    pub position_amt: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit", with = "rust_decimal::serde::str")]
    pub unrealized_profit: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub liquidation_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub notional: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub initial_margin: Option<Decimal>,
}

impl Position {
    /// Whether the position holds a non-zero amount.
    pub fn is_open(&self) -> bool {
        !self.position_amt.is_zero()
    }

    /// Direction derived from the sign of the amount.
    pub fn direction(&self) -> PositionSide {
        if self.position_amt > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }
}

/// Position side (long, short, or both for one-way mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Both,
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens (or adds to) this position side.
    pub fn opening_side(&self) -> OrderSide {
        match self {
            PositionSide::Short => OrderSide::Sell,
            _ => OrderSide::Buy,
        }
    }

    /// Order side that reduces or closes this position side.
    pub fn closing_side(&self) -> OrderSide {
        match self.opening_side() {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Both => write!(f, "BOTH"),
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopMarket,
    TakeProfit,
    TakeProfitMarket,
    TrailingStopMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::Stop => "STOP",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::TrailingStopMarket => "TRAILING_STOP_MARKET",
        }
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    ExpiredInMatch,
}

/// New market order request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: Option<PositionSide>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub reduce_only: Option<bool>,
    pub new_client_order_id: Option<String>,
}

impl NewOrder {
    /// Market order in hedge mode.
    pub fn market(
        symbol: &str,
        side: OrderSide,
        position_side: PositionSide,
        quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            position_side: Some(position_side),
            order_type: OrderType::Market,
            quantity: Some(quantity),
            reduce_only: None,
            new_client_order_id: None,
        }
    }
}

/// Order response from the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub symbol: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub avg_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub orig_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    pub side: OrderSide,
    #[serde(default)]
    pub position_side: Option<PositionSide>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub update_time: i64,
}

/// Conditional (algo) order request: take profit or stop loss that closes
/// the whole position once the trigger price is hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub trigger_price: Decimal,
    pub close_position: bool,
}

/// Acknowledgement for a placed algo order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoOrderResponse {
    pub algo_id: i64,
    pub symbol: String,
    #[serde(default)]
    pub algo_status: Option<String>,
}

/// An open algo (conditional) order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoOrder {
    pub algo_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub trigger_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub stop_price: Option<Decimal>,
}

impl AlgoOrder {
    /// Trigger price, falling back to the legacy stopPrice field.
    pub fn trigger(&self) -> Option<Decimal> {
        self.trigger_price
            .filter(|p| !p.is_zero())
            .or(self.stop_price.filter(|p| !p.is_zero()))
    }
}

/// Binance error payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_rules_from_filters() {
        let json = r#"{
            "symbol": "DOGEUSDT",
            "contractType": "PERPETUAL",
            "status": "TRADING",
            "baseAsset": "DOGE",
            "quoteAsset": "USDT",
            "pricePrecision": 6,
            "quantityPrecision": 0,
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.002440", "maxPrice": "30", "tickSize": "0.000010"},
                {"filterType": "LOT_SIZE", "minQty": "1", "maxQty": "50000000", "stepSize": "1"},
                {"filterType": "MARKET_LOT_SIZE", "minQty": "1", "maxQty": "30000000", "stepSize": "1"},
                {"filterType": "MAX_NUM_ORDERS", "limit": 200},
                {"filterType": "MIN_NOTIONAL", "notional": "5"},
                {"filterType": "PERCENT_PRICE", "multiplierUp": "1.0500", "multiplierDown": "0.9500", "multiplierDecimal": "4"}
            ]
        }"#;

        let info: FuturesSymbolInfo = serde_json::from_str(json).unwrap();
        assert!(info.is_usdt_perpetual());
        assert!(info.is_trading());

        let rules = info.rules();
        assert_eq!(rules.min_qty, dec!(1));
        assert_eq!(rules.step_size, dec!(1));
        assert_eq!(rules.min_notional, dec!(5));
        assert_eq!(rules.tick_size, dec!(0.00001));
    }

    #[test]
    fn test_rules_fall_back_to_precision() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "contractType": "PERPETUAL",
            "status": "TRADING",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "pricePrecision": 2,
            "quantityPrecision": 3
        }"#;

        let info: FuturesSymbolInfo = serde_json::from_str(json).unwrap();
        let rules = info.rules();
        assert_eq!(rules.step_size, dec!(0.001));
        assert_eq!(rules.tick_size, dec!(0.01));
        assert_eq!(rules.min_notional, Decimal::ZERO);
    }

    #[test]
    fn test_position_direction() {
        let json = r#"{
            "symbol": "ETHUSDT",
            "positionSide": "SHORT",
            "positionAmt": "-0.500",
            "entryPrice": "3000.0",
            "markPrice": "2990.0",
            "unRealizedProfit": "5.0",
            "liquidationPrice": "3500",
            "notional": "-1495.0",
            "initialMargin": "29.9"
        }"#;

        let position: Position = serde_json::from_str(json).unwrap();
        assert!(position.is_open());
        assert_eq!(position.direction(), PositionSide::Short);
        assert_eq!(position.initial_margin, Some(dec!(29.9)));
    }

    #[test]
    fn test_side_mapping() {
        assert_eq!(PositionSide::Long.opening_side(), OrderSide::Buy);
        assert_eq!(PositionSide::Long.closing_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.opening_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.closing_side(), OrderSide::Buy);
    }

    #[test]
    fn test_algo_order_trigger_fallback() {
        let json = r#"{
            "algoId": 7,
            "symbol": "BTCUSDT",
            "side": "SELL",
            "positionSide": "LONG",
            "orderType": "TAKE_PROFIT_MARKET",
            "triggerPrice": "0",
            "stopPrice": "71000"
        }"#;

        let order: AlgoOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.trigger(), Some(dec!(71000)));
    }
}

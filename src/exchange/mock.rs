//! Simulated futures exchange for paper trading and tests.
//!
//! Keeps hedge-mode positions, leverage settings and conditional orders in
//! memory and enforces the same sizing filters Binance does (minimum
//! notional, minimum quantity, step size), so the batch flows can be driven
//! end to end without touching a real account.

use super::error::ExchangeError;
use super::traits::FuturesExchange;
use super::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const MAX_LEVERAGE: u8 = 125;

/// Simulated hedge-mode position.
#[derive(Debug, Clone)]
pub struct MockPosition {
    pub symbol: String,
    pub position_side: PositionSide,
    /// Absolute quantity held
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: u8,
}

/// Mock trading state.
#[derive(Debug, Default)]
pub struct MockTradingState {
    pub balance: Decimal,
    pub positions: HashMap<(String, PositionSide), MockPosition>,
    pub leverage: HashMap<String, u8>,
    pub max_leverage: HashMap<String, u8>,
    pub orders: Vec<NewOrder>,
    pub conditional_orders: Vec<AlgoOrder>,
    pub total_trading_fees: Decimal,
    /// Errors returned by the next order(s) for a symbol
    pub order_failures: HashMap<String, VecDeque<ExchangeError>>,
    pub fail_balance: bool,
    pub fail_conditional_orders: bool,
}

/// Mock client that simulates Binance USDT-M futures responses.
pub struct MockExchange {
    state: Arc<RwLock<MockTradingState>>,
    symbols: Arc<RwLock<HashMap<String, FuturesSymbolInfo>>>,
    tickers: Arc<RwLock<HashMap<String, Ticker24h>>>,
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    order_id_counter: AtomicI64,
    /// Trading fee rate (0.04% taker)
    fee_rate: Decimal,
}

impl MockExchange {
    /// Create a new mock exchange with an initial USDT balance.
    pub fn new(initial_balance: Decimal) -> Self {
        let state = MockTradingState {
            balance: initial_balance,
            ..Default::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            symbols: Arc::new(RwLock::new(HashMap::new())),
            tickers: Arc::new(RwLock::new(HashMap::new())),
            prices: Arc::new(RwLock::new(HashMap::new())),
            order_id_counter: AtomicI64::new(1),
            fee_rate: dec!(0.0004),
        }
    }

    /// Copy contract metadata and prices from another exchange (paper mode).
    pub async fn seed_from(&self, source: &dyn FuturesExchange) -> Result<()> {
        let info = source.exchange_info().await?;
        let tickers = source.tickers_24h().await?;

        {
            let mut symbols = self.symbols.write().await;
            for symbol in info.symbols {
                symbols.insert(symbol.symbol.clone(), symbol);
            }
        }
        self.update_tickers(tickers).await;

        info!(
            symbols = self.symbols.read().await.len(),
            "Mock exchange seeded from live market data"
        );
        Ok(())
    }

    /// Replace 24h tickers and derive last prices from them.
    pub async fn update_tickers(&self, tickers: Vec<Ticker24h>) {
        let mut prices = self.prices.write().await;
        let mut stored = self.tickers.write().await;
        for ticker in tickers {
            prices.insert(ticker.symbol.clone(), ticker.last_price);
            stored.insert(ticker.symbol.clone(), ticker);
        }
    }

    /// Register a USDT perpetual with explicit sizing filters.
    pub async fn add_symbol(
        &self,
        symbol: &str,
        min_qty: Decimal,
        step_size: Decimal,
        min_notional: Decimal,
        tick_size: Decimal,
    ) {
        let base_asset = symbol.trim_end_matches("USDT").to_string();
        let info = FuturesSymbolInfo {
            symbol: symbol.to_string(),
            contract_type: "PERPETUAL".to_string(),
            status: "TRADING".to_string(),
            base_asset,
            quote_asset: "USDT".to_string(),
            quantity_precision: step_size.scale(),
            price_precision: tick_size.scale(),
            filters: vec![
                SymbolFilter::PriceFilter { tick_size },
                SymbolFilter::LotSize {
                    min_qty,
                    max_qty: dec!(100000000),
                    step_size,
                },
                SymbolFilter::MinNotional {
                    notional: min_notional,
                },
            ],
        };
        self.symbols.write().await.insert(symbol.to_string(), info);
    }

    /// Change a registered symbol's trading status (e.g. "SETTLING").
    pub async fn set_symbol_status(&self, symbol: &str, status: &str) {
        if let Some(info) = self.symbols.write().await.get_mut(symbol) {
            info.status = status.to_string();
        }
    }

    /// Set last price for a symbol.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Set 24h change and quote volume used by the ticker listing.
    pub async fn set_ticker(&self, symbol: &str, price: Decimal, change_percent: Decimal, quote_volume: Decimal) {
        self.set_price(symbol, price).await;
        self.tickers.write().await.insert(
            symbol.to_string(),
            Ticker24h {
                symbol: symbol.to_string(),
                price_change: Decimal::ZERO,
                price_change_percent: change_percent,
                last_price: price,
                volume: Decimal::ZERO,
                quote_volume,
                close_time: 0,
            },
        );
    }

    /// Open a position directly, bypassing order checks.
    pub async fn open_position(
        &self,
        symbol: &str,
        position_side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: u8,
    ) {
        self.state.write().await.positions.insert(
            (symbol.to_string(), position_side),
            MockPosition {
                symbol: symbol.to_string(),
                position_side,
                quantity,
                entry_price,
                leverage,
            },
        );
    }

    /// Highest leverage the symbol accepts.
    pub async fn set_max_leverage(&self, symbol: &str, max_leverage: u8) {
        self.state
            .write()
            .await
            .max_leverage
            .insert(symbol.to_string(), max_leverage);
    }

    /// Make the next order for `symbol` fail with a Binance error.
    pub async fn fail_next_order(&self, symbol: &str, code: i64, msg: &str) {
        self.state
            .write()
            .await
            .order_failures
            .entry(symbol.to_string())
            .or_default()
            .push_back(ExchangeError::Api {
                status: 400,
                code,
                msg: msg.to_string(),
            });
    }

    /// Make balance requests fail (credential errors look like this).
    pub async fn set_balance_failure(&self, fail: bool) {
        self.state.write().await.fail_balance = fail;
    }

    /// Make conditional order placement fail.
    pub async fn set_conditional_failure(&self, fail: bool) {
        self.state.write().await.fail_conditional_orders = fail;
    }

    /// Orders accepted so far.
    pub async fn orders(&self) -> Vec<NewOrder> {
        self.state.read().await.orders.clone()
    }

    /// Open conditional orders.
    pub async fn conditional_orders(&self) -> Vec<AlgoOrder> {
        self.state.read().await.conditional_orders.clone()
    }

    /// Leverage last set for a symbol.
    pub async fn leverage_for(&self, symbol: &str) -> Option<u8> {
        self.state.read().await.leverage.get(symbol).copied()
    }

    /// Current balance.
    pub async fn balance(&self) -> Decimal {
        self.state.read().await.balance
    }

    fn next_order_id(&self) -> i64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    async fn price_of(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("No price available for {}", symbol))
    }

    fn rejection(code: i64, msg: String) -> anyhow::Error {
        ExchangeError::Api {
            status: 400,
            code,
            msg,
        }
        .into()
    }
}

#[async_trait]
impl FuturesExchange for MockExchange {
    async fn exchange_info(&self) -> Result<FuturesExchangeInfo> {
        let symbols = self.symbols.read().await.values().cloned().collect();
        Ok(FuturesExchangeInfo { symbols })
    }

    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>> {
        let tickers = self.tickers.read().await;
        let prices = self.prices.read().await;

        Ok(prices
            .iter()
            .map(|(symbol, price)| match tickers.get(symbol) {
                Some(ticker) => Ticker24h {
                    last_price: *price,
                    ..ticker.clone()
                },
                None => Ticker24h {
                    symbol: symbol.clone(),
                    price_change: Decimal::ZERO,
                    price_change_percent: Decimal::ZERO,
                    last_price: *price,
                    volume: Decimal::ZERO,
                    quote_volume: Decimal::ZERO,
                    close_time: 0,
                },
            })
            .collect())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        self.price_of(symbol).await
    }

    async fn account_balance(&self) -> Result<Vec<AccountBalance>> {
        let state = self.state.read().await;
        if state.fail_balance {
            return Err(Self::rejection(
                -2008,
                "Invalid Api-Key ID.".to_string(),
            ));
        }

        let used_margin: Decimal = state
            .positions
            .values()
            .map(|p| p.quantity * p.entry_price / Decimal::from(p.leverage.max(1)))
            .sum();

        Ok(vec![AccountBalance {
            asset: "USDT".to_string(),
            balance: state.balance,
            cross_unrealized_pnl: Some(Decimal::ZERO),
            available_balance: (state.balance - used_margin).max(Decimal::ZERO),
        }])
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let state = self.state.read().await;
        let prices = self.prices.read().await;

        let mut positions: Vec<Position> = state
            .positions
            .values()
            .map(|p| {
                let mark = prices.get(&p.symbol).copied().unwrap_or(p.entry_price);
                let signed_qty = match p.position_side {
                    PositionSide::Short => -p.quantity,
                    _ => p.quantity,
                };
                let notional = signed_qty * mark;
                Position {
                    symbol: p.symbol.clone(),
                    position_side: p.position_side,
                    position_amt: signed_qty,
                    entry_price: p.entry_price,
                    mark_price: mark,
                    unrealized_profit: (mark - p.entry_price) * signed_qty,
                    liquidation_price: None,
                    notional,
                    initial_margin: Some(notional.abs() / Decimal::from(p.leverage.max(1))),
                }
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        Ok(positions)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<()> {
        let mut state = self.state.write().await;
        let max = state
            .max_leverage
            .get(symbol)
            .copied()
            .unwrap_or(MAX_LEVERAGE);

        if leverage == 0 || leverage > max {
            return Err(Self::rejection(
                -4028,
                format!("Leverage {} is not valid", leverage),
            ));
        }

        state.leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn place_order(&self, order: &NewOrder) -> Result<OrderResponse> {
        let price = self.price_of(&order.symbol).await?;
        let rules = self
            .symbols
            .read()
            .await
            .get(&order.symbol)
            .map(FuturesSymbolInfo::rules)
            .unwrap_or_default();

        let mut state = self.state.write().await;

        if let Some(error) = state
            .order_failures
            .get_mut(&order.symbol)
            .and_then(VecDeque::pop_front)
        {
            return Err(error.into());
        }

        let quantity = order.quantity.unwrap_or_default();
        if quantity <= Decimal::ZERO {
            return Err(Self::rejection(
                -4003,
                "Quantity less than or equal to zero.".to_string(),
            ));
        }
        if !rules.step_size.is_zero() && !(quantity % rules.step_size).is_zero() {
            return Err(Self::rejection(
                -1111,
                "Precision is over the maximum defined for this asset.".to_string(),
            ));
        }

        let position_side = order.position_side.unwrap_or(PositionSide::Both);
        let opening = order.side == position_side.opening_side();
        let key = (order.symbol.clone(), position_side);

        if opening {
            if quantity < rules.min_qty {
                return Err(Self::rejection(
                    -4003,
                    format!("Quantity less than minimum {}", rules.min_qty),
                ));
            }
            if quantity * price < rules.min_notional {
                return Err(Self::rejection(
                    -4164,
                    format!(
                        "Order's notional must be no smaller than {} (unless you choose reduce only).",
                        rules.min_notional
                    ),
                ));
            }

            let leverage = state.leverage.get(&order.symbol).copied().unwrap_or(20);
            let position = state.positions.entry(key).or_insert(MockPosition {
                symbol: order.symbol.clone(),
                position_side,
                quantity: Decimal::ZERO,
                entry_price: price,
                leverage,
            });
            let new_qty = position.quantity + quantity;
            position.entry_price =
                (position.entry_price * position.quantity + price * quantity) / new_qty;
            position.quantity = new_qty;
        } else {
            let remaining = match state.positions.get_mut(&key) {
                Some(position) if position.quantity >= quantity => {
                    position.quantity -= quantity;
                    position.quantity
                }
                _ => {
                    return Err(Self::rejection(
                        -2022,
                        "ReduceOnly Order is rejected.".to_string(),
                    ))
                }
            };

            if remaining.is_zero() {
                state.positions.remove(&key);
                state
                    .conditional_orders
                    .retain(|o| !(o.symbol == order.symbol && o.position_side == position_side));
            }
        }

        let fee = quantity * price * self.fee_rate;
        state.balance -= fee;
        state.total_trading_fees += fee;
        state.orders.push(order.clone());

        let order_id = self.next_order_id();
        debug!(
            symbol = %order.symbol,
            side = ?order.side,
            %quantity,
            %price,
            order_id,
            "Mock order filled"
        );

        Ok(OrderResponse {
            order_id,
            symbol: order.symbol.clone(),
            status: OrderStatus::Filled,
            client_order_id: format!("mock-{}", order_id),
            avg_price: Some(price),
            orig_qty: quantity,
            executed_qty: quantity,
            side: order.side,
            position_side: order.position_side,
            order_type: order.order_type,
            update_time: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn place_conditional_order(&self, order: &ConditionalOrder) -> Result<AlgoOrderResponse> {
        let mut state = self.state.write().await;
        if state.fail_conditional_orders {
            return Err(Self::rejection(
                -2021,
                "Order would immediately trigger.".to_string(),
            ));
        }

        let algo_id = self.next_order_id();
        state.conditional_orders.push(AlgoOrder {
            algo_id,
            symbol: order.symbol.clone(),
            side: order.side,
            position_side: order.position_side,
            order_type: order.order_type,
            trigger_price: Some(order.trigger_price),
            stop_price: None,
        });

        Ok(AlgoOrderResponse {
            algo_id,
            symbol: order.symbol.clone(),
            algo_status: Some("NEW".to_string()),
        })
    }

    async fn open_conditional_orders(&self) -> Result<Vec<AlgoOrder>> {
        Ok(self.state.read().await.conditional_orders.clone())
    }
}

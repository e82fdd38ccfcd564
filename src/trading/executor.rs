//! Batch order execution.
//!
//! Symbols are processed one after another. Every symbol yields exactly one
//! [`SymbolResult`]; a failure on one symbol never aborts the rest of the
//! batch. Only the shared lookups made before the loop (open positions) can
//! fail the whole request.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::batch::{
    base_asset, normalize_symbol, CloseFilter, IgnoreList, SymbolResult, ALREADY_OPEN, IGNORED,
    NO_POSITION,
};
use super::sizing::{cap_notional, retry_notional, size_quantity, target_notional};
use super::tpsl::TriggerPrices;
use crate::config::TradingConfig;
use crate::exchange::{
    asset_balance, is_notional_rejection, FuturesExchange, MarketRules, NewOrder, OrderResponse,
    PositionSide,
};

/// A market order that was accepted, with the figures it was sized from.
struct PlacedOrder {
    order: OrderResponse,
    quantity: Decimal,
    price: Decimal,
}

/// Opens, adds to and closes positions for lists of symbols.
pub struct BatchExecutor {
    exchange: Arc<dyn FuturesExchange>,
    config: TradingConfig,
}

impl BatchExecutor {
    pub fn new(exchange: Arc<dyn FuturesExchange>, config: TradingConfig) -> Self {
        Self { exchange, config }
    }

    /// Open a new position on every symbol that has none.
    ///
    /// Ignored symbols and symbols with any open position are skipped.
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn open_batch(&self, symbols: &[String], side: PositionSide) -> Result<Vec<SymbolResult>> {
        let (margin, leverage) = self.config.margin_and_leverage(side);
        let notional = target_notional(margin, leverage);
        let ignored = IgnoreList::parse(&self.config.ignored_symbols);

        info!(
            %side,
            %margin,
            leverage,
            %notional,
            take_profit = ?self.config.take_profit_percent(),
            stop_loss = ?self.config.stop_loss_percent(),
            "Opening batch"
        );

        let symbols: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        if symbols.iter().all(|s| ignored.contains(s)) {
            warn!("Every requested symbol is on the ignore list");
            return Ok(symbols
                .iter()
                .map(|s| SymbolResult::skipped(s, IGNORED))
                .collect());
        }

        let balance = self.available_balance().await;
        let mut open = self.open_symbols().await?;
        let rules = self.market_rules().await;

        let mut results = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            if ignored.contains(symbol) {
                debug!(%symbol, "Skipping ignored symbol");
                results.push(SymbolResult::skipped(symbol, IGNORED));
                continue;
            }
            if open.contains(symbol) {
                results.push(SymbolResult::skipped(symbol, ALREADY_OPEN));
                continue;
            }

            let symbol_rules = rules.get(symbol).copied().unwrap_or_default();
            let result = self
                .open_one(symbol, side, leverage, notional, balance, &symbol_rules)
                .await;
            // Repeats later in the same batch must see the new position
            if result.is_success() {
                open.insert(symbol.clone());
            }
            results.push(result);
        }

        log_summary("Open batch", &results);
        Ok(results)
    }

    /// Add one more configured-size market order to existing positions.
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn add_margin(&self, symbols: &[String], side: PositionSide) -> Result<Vec<SymbolResult>> {
        let (margin, leverage) = self.config.margin_and_leverage(side);
        let notional = target_notional(margin, leverage);
        info!(%side, %margin, leverage, %notional, "Adding to positions");

        let balance = self.available_balance().await;
        let open = self.open_symbols().await?;
        let rules = self.market_rules().await;

        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols.iter().map(|s| normalize_symbol(s)) {
            if !open.contains(&symbol) {
                results.push(SymbolResult::skipped(&symbol, NO_POSITION));
                continue;
            }

            let target = cap_notional(notional, balance, self.config.max_balance_fraction);
            let symbol_rules = rules.get(&symbol).copied().unwrap_or_default();
            let result = match self.place_sized(&symbol, side, target, &symbol_rules).await {
                Ok(placed) => {
                    info!(
                        %symbol,
                        order_id = placed.order.order_id,
                        quantity = %placed.quantity,
                        "Added to position"
                    );
                    SymbolResult::success(&symbol, placed.order.order_id)
                }
                Err(e) => {
                    error!(%symbol, error = %e, "Failed to add to position");
                    SymbolResult::failed(&symbol, format!("{:#}", e))
                }
            };
            results.push(result);
        }

        log_summary("Add margin", &results);
        Ok(results)
    }

    /// Market-close every open position matching the filter and, when given,
    /// the symbol list.
    #[instrument(skip(self, symbols))]
    pub async fn close_positions(
        &self,
        filter: CloseFilter,
        symbols: Option<&[String]>,
    ) -> Result<Vec<SymbolResult>> {
        let targets: Option<HashSet<String>> =
            symbols.map(|list| list.iter().map(|s| normalize_symbol(s)).collect());

        let positions = self
            .exchange
            .positions()
            .await
            .context("Failed to fetch positions")?;

        let mut results = Vec::new();
        for position in positions.iter().filter(|p| p.is_open()) {
            if let Some(targets) = &targets {
                if !targets.contains(&position.symbol) {
                    continue;
                }
            }

            let direction = position.direction();
            if !filter.matches(direction) {
                continue;
            }

            let order = NewOrder::market(
                &position.symbol,
                direction.closing_side(),
                position.position_side,
                position.position_amt.abs(),
            );

            match self.exchange.place_order(&order).await {
                Ok(response) => {
                    info!(
                        symbol = %position.symbol,
                        side = %direction,
                        quantity = %position.position_amt.abs(),
                        order_id = response.order_id,
                        "Position closed"
                    );
                    results.push(SymbolResult::closed(&position.symbol));
                }
                Err(e) => {
                    error!(symbol = %position.symbol, error = %e, "Failed to close position");
                    results.push(SymbolResult::failed(&position.symbol, format!("{:#}", e)));
                }
            }
        }

        log_summary("Close", &results);
        Ok(results)
    }

    async fn open_one(
        &self,
        symbol: &str,
        side: PositionSide,
        leverage: u8,
        notional: Decimal,
        balance: Decimal,
        rules: &MarketRules,
    ) -> SymbolResult {
        let actual_leverage = self.apply_leverage(symbol, leverage).await;
        let target = cap_notional(notional, balance, self.config.max_balance_fraction);

        let price = match self.exchange.ticker_price(symbol).await {
            Ok(price) => price,
            Err(e) => return SymbolResult::failed(symbol, format!("{:#}", e)),
        };
        let quantity = match size_quantity(target, price, rules) {
            Ok(quantity) => quantity,
            Err(e) => return SymbolResult::failed(symbol, e.to_string()),
        };

        debug!(
            %symbol,
            %price,
            configured = %notional,
            using = %target,
            %quantity,
            actual = %(quantity * price),
            "Sized order"
        );

        let order = NewOrder::market(symbol, side.opening_side(), side, quantity);
        match self.exchange.place_order(&order).await {
            Ok(response) => {
                info!(%symbol, %side, order_id = response.order_id, %quantity, "Position opened");
                let placed = PlacedOrder {
                    order: response,
                    quantity,
                    price,
                };
                self.place_triggers(symbol, side, &placed, actual_leverage, rules)
                    .await;
                SymbolResult::success(symbol, placed.order.order_id)
            }
            Err(first) if is_notional_rejection(&first) => {
                warn!(%symbol, error = %first, "Order below exchange minimum, retrying with a larger notional");
                self.retry_open(symbol, side, notional, balance, actual_leverage, rules, first)
                    .await
            }
            Err(e) => {
                error!(%symbol, error = %e, "Failed to open position");
                SymbolResult::failed(symbol, format!("{:#}", e))
            }
        }
    }

    /// Single retry after a minimum-notional rejection.
    #[allow(clippy::too_many_arguments)]
    async fn retry_open(
        &self,
        symbol: &str,
        side: PositionSide,
        notional: Decimal,
        balance: Decimal,
        actual_leverage: u8,
        rules: &MarketRules,
        first: anyhow::Error,
    ) -> SymbolResult {
        let retry_target = cap_notional(
            retry_notional(notional, self.config.retry_notional_increment, &base_asset(symbol)),
            balance,
            self.config.max_balance_fraction,
        );
        info!(%symbol, %retry_target, "Retrying with increased notional");

        match self.place_sized(symbol, side, retry_target, rules).await {
            Ok(placed) => {
                info!(%symbol, order_id = placed.order.order_id, "Retry succeeded");
                self.place_triggers(symbol, side, &placed, actual_leverage, rules)
                    .await;
                SymbolResult::retried(symbol, placed.order.order_id)
            }
            Err(second) => {
                error!(%symbol, error = %second, "Retry also failed");
                SymbolResult::failed(
                    symbol,
                    format!("首次失败: {:#}, 重试也失败: {:#}", first, second),
                )
            }
        }
    }

    /// Fetch a fresh price, size and place an opening market order.
    async fn place_sized(
        &self,
        symbol: &str,
        side: PositionSide,
        notional: Decimal,
        rules: &MarketRules,
    ) -> Result<PlacedOrder> {
        let price = self.exchange.ticker_price(symbol).await?;
        let quantity = size_quantity(notional, price, rules)?;
        let order = NewOrder::market(symbol, side.opening_side(), side, quantity);
        let response = self.exchange.place_order(&order).await?;

        Ok(PlacedOrder {
            order: response,
            quantity,
            price,
        })
    }

    /// Set leverage, stepping down the fallback ladder on rejection.
    ///
    /// Returns the leverage in force, or 1 when nothing was accepted and the
    /// account's existing leverage applies.
    async fn apply_leverage(&self, symbol: &str, leverage: u8) -> u8 {
        let first_error = match self.exchange.set_leverage(symbol, leverage).await {
            Ok(()) => {
                debug!(%symbol, leverage, "Leverage set");
                return leverage;
            }
            Err(e) => e,
        };
        warn!(%symbol, leverage, error = %first_error, "Leverage rejected, trying lower values");

        for &fallback in self.config.leverage_fallbacks.iter().filter(|&&l| l < leverage) {
            match self.exchange.set_leverage(symbol, fallback).await {
                Ok(()) => {
                    info!(%symbol, requested = leverage, actual = fallback, "Leverage lowered");
                    return fallback;
                }
                Err(e) => debug!(%symbol, fallback, error = %e, "Fallback leverage rejected"),
            }
        }

        warn!(%symbol, "Could not set leverage, proceeding with current account leverage");
        1
    }

    /// Place take-profit / stop-loss orders. Failures are logged only.
    async fn place_triggers(
        &self,
        symbol: &str,
        side: PositionSide,
        placed: &PlacedOrder,
        actual_leverage: u8,
        rules: &MarketRules,
    ) {
        let take_profit = self.config.take_profit_percent();
        let stop_loss = self.config.stop_loss_percent();
        if take_profit.is_none() && stop_loss.is_none() {
            return;
        }

        let entry = placed
            .order
            .avg_price
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(placed.price);
        let actual_notional = placed.quantity * entry;
        let actual_margin = actual_notional / Decimal::from(actual_leverage.max(1));

        let triggers = TriggerPrices::derive(
            side,
            entry,
            placed.quantity,
            actual_margin,
            take_profit,
            stop_loss,
            rules.tick_size,
        );
        debug!(
            %symbol,
            %entry,
            %actual_margin,
            take_profit = ?triggers.take_profit,
            stop_loss = ?triggers.stop_loss,
            "Derived trigger prices"
        );

        if take_profit.is_some() && triggers.take_profit.is_none() {
            warn!(%symbol, "Take profit trigger is not positive, skipping");
        }
        if stop_loss.is_some() && triggers.stop_loss.is_none() {
            warn!(%symbol, "Stop loss trigger is not positive, skipping");
        }

        for order in triggers.orders(symbol, side) {
            match self.exchange.place_conditional_order(&order).await {
                Ok(response) => info!(
                    %symbol,
                    order_type = order.order_type.as_str(),
                    trigger = %order.trigger_price,
                    algo_id = response.algo_id,
                    "Trigger order placed"
                ),
                Err(e) => warn!(
                    %symbol,
                    order_type = order.order_type.as_str(),
                    error = %e,
                    "Failed to place trigger order"
                ),
            }
        }
    }

    /// Available USDT, or the configured fallback when it cannot be read.
    async fn available_balance(&self) -> Decimal {
        match self.exchange.account_balance().await {
            Ok(balances) => match asset_balance(&balances, "USDT") {
                Some(usdt) if usdt.available_balance > Decimal::ZERO => {
                    debug!(available = %usdt.available_balance, "USDT balance");
                    usdt.available_balance
                }
                _ => {
                    warn!(fallback = %self.config.fallback_balance, "No USDT balance reported, using fallback");
                    self.config.fallback_balance
                }
            },
            Err(e) => {
                warn!(error = %e, fallback = %self.config.fallback_balance, "Could not fetch balance, using fallback");
                self.config.fallback_balance
            }
        }
    }

    /// Symbols holding a position on either side.
    async fn open_symbols(&self) -> Result<HashSet<String>> {
        let positions = self
            .exchange
            .positions()
            .await
            .context("Failed to fetch positions")?;

        Ok(positions
            .into_iter()
            .filter(|p| p.is_open())
            .map(|p| p.symbol)
            .collect())
    }

    /// Sizing rules per symbol. Missing metadata falls back to default rules.
    async fn market_rules(&self) -> HashMap<String, MarketRules> {
        match self.exchange.exchange_info().await {
            Ok(info) => info
                .symbols
                .iter()
                .map(|s| (s.symbol.clone(), s.rules()))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not fetch exchange info, using default market rules");
                HashMap::new()
            }
        }
    }
}

fn log_summary(operation: &str, results: &[SymbolResult]) {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    info!(
        operation,
        total = results.len(),
        succeeded,
        failed = results.len() - succeeded,
        "Batch finished"
    );
}

//! Exchange abstraction used by the trading flows.
//!
//! The live [`BinanceClient`](super::BinanceClient) and the simulated
//! [`MockExchange`](super::MockExchange) both implement [`FuturesExchange`],
//! so batch execution and position reading never depend on a concrete venue.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use super::types::*;

/// USDT-M futures operations needed to open, add to, close and inspect
/// positions.
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// Contract metadata and sizing filters for all symbols.
    async fn exchange_info(&self) -> Result<FuturesExchangeInfo>;

    /// 24-hour statistics for all symbols.
    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>>;

    /// Latest traded price for one symbol.
    async fn ticker_price(&self, symbol: &str) -> Result<Decimal>;

    /// Futures wallet balances per asset.
    async fn account_balance(&self) -> Result<Vec<AccountBalance>>;

    /// Position risk for every symbol (including empty positions).
    async fn positions(&self) -> Result<Vec<Position>>;

    /// Set initial leverage for a symbol.
    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<()>;

    /// Place a futures order.
    async fn place_order(&self, order: &NewOrder) -> Result<OrderResponse>;

    /// Place a conditional take-profit / stop-loss order.
    async fn place_conditional_order(&self, order: &ConditionalOrder) -> Result<AlgoOrderResponse>;

    /// All open conditional orders across symbols.
    async fn open_conditional_orders(&self) -> Result<Vec<AlgoOrder>>;
}

/// Balance of a single asset, looked up case-sensitively.
pub fn asset_balance<'a>(balances: &'a [AccountBalance], asset: &str) -> Option<&'a AccountBalance> {
    balances.iter().find(|b| b.asset == asset)
}

/// Source of market capitalisation rankings.
#[async_trait]
pub trait MarketCapSource: Send + Sync {
    /// Coins ordered by market cap, best first.
    async fn market_caps(&self) -> Result<Vec<super::coingecko::CoinMarket>>;
}

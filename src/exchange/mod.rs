//! Exchange integrations.
//!
//! ## Binance
//! Signed REST access to the USDT-M futures API for:
//! - Market data (exchange info, 24h tickers, prices)
//! - Account operations (balance, positions, leverage, orders)
//! - Conditional take-profit / stop-loss (algo) orders
//!
//! ## CoinGecko
//! Market cap rankings used to order the top-market list.
//!
//! ## Mock
//! In-memory simulated exchange for paper trading and tests.

mod client;
pub mod coingecko;
mod error;
pub mod mock;
mod traits;
mod types;

pub use client::BinanceClient;
pub use coingecko::{CoinGeckoClient, CoinMarket};
pub use error::{credential_failure, is_notional_rejection, ExchangeError};
pub use mock::MockExchange;
pub use traits::{asset_balance, FuturesExchange, MarketCapSource};
pub use types::*;

//! # Futures Desk
//!
//! Backend for a Binance USDT-M futures dashboard: ranks contracts, opens
//! and closes positions in batches, and streams open positions.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Binance REST client, CoinGecko market caps, simulated exchange
//! - `trading`: Position sizing, TP/SL, batch execution, rankings, positions
//! - `api`: HTTP routes and the position stream
//! - `utils`: Shared utilities and decimal arithmetic

pub mod api;
pub mod config;
pub mod exchange;
pub mod trading;
pub mod utils;

pub use config::Config;

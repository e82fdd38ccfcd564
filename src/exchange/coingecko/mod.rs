//! CoinGecko integration.
//!
//! Read-only access to market capitalisation rankings, used to order the
//! futures universe by market cap. CoinGecko knows coins by ticker only, so
//! the join with Binance contracts happens on base asset.

mod client;
mod types;

pub use client::CoinGeckoClient;
pub use types::*;

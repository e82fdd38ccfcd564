//! Type definitions for CoinGecko API responses.

use serde::Deserialize;

/// One entry of the `coins/markets` listing.
///
/// CoinGecko reports numbers as JSON floats and leaves them null for
/// coins without data.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinMarket {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
}

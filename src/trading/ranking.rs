//! Ranking lists: market-cap top-N, 24h gainers and 24h losers.

use anyhow::{Context, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::exchange::{CoinMarket, FuturesExchange, MarketCapSource};

const STABLECOINS: [&str; 15] = [
    "USDT", "USDC", "BUSD", "DAI", "TUSD", "USDP", "USDD", "GUSD", "FRAX", "LUSD", "SUSD", "USDK",
    "USDN", "FDUSD", "PYUSD",
];

/// One row of a ranking list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingItem {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// 24h change in percent
    #[serde(with = "rust_decimal::serde::float")]
    pub change: Decimal,
    /// 24h quote volume in USDT
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    pub volume_formatted: String,
    pub market_cap: f64,
    pub market_cap_formatted: String,
    pub rank: Option<u32>,
}

/// The three lists served to the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rankings {
    pub top_market: Vec<RankingItem>,
    pub top_gainers: Vec<RankingItem>,
    pub top_losers: Vec<RankingItem>,
}

#[derive(Debug, Clone, Copy)]
struct MarketCap {
    value: f64,
    rank: u32,
}

/// Candidate contract with its join data.
struct Entry {
    item: RankingItem,
    trading: bool,
    has_market_cap: bool,
}

/// Builds ranking lists from exchange tickers and market cap data.
pub struct MarketRanker {
    exchange: Arc<dyn FuturesExchange>,
    market_caps: Arc<dyn MarketCapSource>,
}

impl MarketRanker {
    pub fn new(exchange: Arc<dyn FuturesExchange>, market_caps: Arc<dyn MarketCapSource>) -> Self {
        Self {
            exchange,
            market_caps,
        }
    }

    /// Build the ranking lists, each truncated to `limit` entries.
    ///
    /// A market cap failure degrades the top-market list to volume order.
    #[instrument(skip(self))]
    pub async fn rankings(&self, limit: usize, skip_market_cap: bool) -> Result<Rankings> {
        let caps = if skip_market_cap {
            HashMap::new()
        } else {
            match self.market_caps.market_caps().await {
                Ok(coins) => market_cap_index(&coins),
                Err(e) => {
                    warn!(error = %e, "Failed to fetch market cap data, ranking by volume");
                    HashMap::new()
                }
            }
        };

        let (info, tickers) = tokio::try_join!(self.exchange.exchange_info(), self.exchange.tickers_24h())
            .context("Failed to fetch market data")?;

        let contracts: HashMap<&str, _> = info
            .symbols
            .iter()
            .filter(|s| s.is_usdt_perpetual() && !is_stablecoin(&s.base_asset))
            .map(|s| (s.symbol.as_str(), s))
            .collect();

        let entries: Vec<Entry> = tickers
            .iter()
            .filter_map(|ticker| {
                let contract = contracts.get(ticker.symbol.as_str())?;
                let cap = lookup_market_cap(&caps, &contract.base_asset);
                Some(Entry {
                    item: RankingItem {
                        symbol: ticker.symbol.clone(),
                        price: ticker.last_price,
                        change: ticker.price_change_percent,
                        volume: ticker.quote_volume,
                        volume_formatted: format_volume(ticker.quote_volume),
                        market_cap: cap.map(|c| c.value).unwrap_or(0.0),
                        market_cap_formatted: cap
                            .map(|c| format_market_cap(c.value))
                            .unwrap_or_else(|| "N/A".to_string()),
                        rank: cap.map(|c| c.rank),
                    },
                    trading: contract.is_trading(),
                    has_market_cap: cap.is_some(),
                })
            })
            .collect();

        let with_cap = entries.iter().filter(|e| e.has_market_cap).count();
        debug!(contracts = entries.len(), with_cap, "Joined tickers with market caps");

        let mut top_market: Vec<&Entry> = if with_cap >= limit {
            let mut ranked: Vec<&Entry> = entries.iter().filter(|e| e.has_market_cap).collect();
            ranked.sort_by_key(|e| e.item.rank.unwrap_or(u32::MAX));
            ranked
        } else {
            let mut by_volume: Vec<&Entry> = entries.iter().collect();
            by_volume.sort_by(|a, b| b.item.volume.cmp(&a.item.volume));
            by_volume
        };
        top_market.truncate(limit);

        let mut trading: Vec<&Entry> = entries.iter().filter(|e| e.trading).collect();
        trading.sort_by(|a, b| b.item.change.cmp(&a.item.change));
        let top_gainers = take_items(trading.iter().copied(), limit);
        let top_losers = take_items(trading.iter().rev().copied(), limit);

        info!(
            top_market = top_market.len(),
            gainers = top_gainers.len(),
            losers = top_losers.len(),
            "Rankings built"
        );

        Ok(Rankings {
            top_market: take_items(top_market.into_iter(), limit),
            top_gainers,
            top_losers,
        })
    }
}

fn take_items<'a>(entries: impl Iterator<Item = &'a Entry>, limit: usize) -> Vec<RankingItem> {
    entries.take(limit).map(|e| e.item.clone()).collect()
}

fn is_stablecoin(asset: &str) -> bool {
    STABLECOINS.contains(&asset.to_uppercase().as_str())
}

/// Index coins by upper-case symbol, keeping the best rank per symbol.
fn market_cap_index(coins: &[CoinMarket]) -> HashMap<String, MarketCap> {
    let mut index: HashMap<String, MarketCap> = HashMap::new();

    for coin in coins {
        let (Some(value), Some(rank)) = (coin.market_cap, coin.market_cap_rank) else {
            continue;
        };
        if value <= 0.0 || coin.symbol.is_empty() {
            continue;
        }

        let symbol = coin.symbol.to_uppercase();
        match index.get(&symbol) {
            Some(existing) if existing.rank < rank => {}
            _ => {
                index.insert(symbol, MarketCap { value, rank });
            }
        }
    }

    index
}

/// Lookup keys for a base asset: itself, then without a numeric multiplier.
fn symbol_variants(base_asset: &str) -> Vec<String> {
    let upper = base_asset.to_uppercase();
    let mut variants = vec![upper.clone()];

    let without_prefix = upper.trim_start_matches(|c: char| c.is_ascii_digit());
    if without_prefix != upper && !without_prefix.is_empty() {
        variants.push(without_prefix.to_string());
    }

    variants
}

fn lookup_market_cap(index: &HashMap<String, MarketCap>, base_asset: &str) -> Option<MarketCap> {
    symbol_variants(base_asset)
        .iter()
        .find_map(|variant| index.get(variant).copied())
}

/// Market cap in Chinese units: 万亿 (1e12), 亿 (1e8), 百万 (1e6).
pub fn format_market_cap(value: f64) -> String {
    if value >= 1e12 {
        format!("{:.2}万亿", value / 1e12)
    } else if value >= 1e8 {
        format!("{:.2}亿", value / 1e8)
    } else if value >= 1e6 {
        format!("{:.2}百万", value / 1e6)
    } else {
        format!("{:.2}", value)
    }
}

/// Volume with B / M / K suffixes.
pub fn format_volume(volume: Decimal) -> String {
    let thousand = Decimal::from(1_000);
    let million = Decimal::from(1_000_000);
    let billion = Decimal::from(1_000_000_000);

    let two_dp = |v: Decimal| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    if volume >= billion {
        format!("{:.2}B", two_dp(volume / billion))
    } else if volume >= million {
        format!("{:.2}M", two_dp(volume / million))
    } else if volume >= thousand {
        format!("{:.2}K", two_dp(volume / thousand))
    } else {
        format!("{:.2}", two_dp(volume))
    }
}

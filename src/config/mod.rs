//! Configuration management for the futures desk.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::PositionSide;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Binance API credentials
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Per-batch trading parameters
    #[serde(default)]
    pub trading: TradingConfig,
    /// Ranking list sources
    #[serde(default)]
    pub market: MarketConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Client-side chunking for large symbol lists
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub secret_key: String,
    /// Use the copy-trading account instead of the main account
    #[serde(default)]
    pub copytrading_mode: bool,
    /// Copy-trading account API key
    #[serde(default)]
    pub copytrading_api_key: String,
    /// Copy-trading account secret key
    #[serde(default)]
    pub copytrading_secret_key: String,
    /// Use testnet instead of production
    #[serde(default)]
    pub testnet: bool,
    /// Override for the futures REST base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// recvWindow sent with signed requests (milliseconds)
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
}

/// Which account's credentials are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    Main,
    Copytrading,
}

/// A resolved API key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub mode: AccountMode,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask_key(&self.api_key))
            .field("secret_key", &"***")
            .field("mode", &self.mode)
            .finish()
    }
}

/// Show only the first 8 characters of a key.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{}... ({} chars)", prefix, key.chars().count())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Leverage for LONG batches
    #[serde(default = "default_leverage")]
    pub long_leverage: u8,
    /// Margin per LONG position in USDT
    #[serde(default = "default_margin")]
    pub long_margin: Decimal,
    /// Leverage for SHORT batches
    #[serde(default = "default_leverage")]
    pub short_leverage: u8,
    /// Margin per SHORT position in USDT
    #[serde(default = "default_margin")]
    pub short_margin: Decimal,
    /// Take profit as a percentage of margin (e.g. 50 = +50% on margin)
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Stop loss as a percentage of margin
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Whitespace-separated base assets that are never traded
    #[serde(default)]
    pub ignored_symbols: String,
    /// Default ranking list length
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Cap on a single position's notional as a fraction of available balance
    #[serde(default = "default_max_balance_fraction")]
    pub max_balance_fraction: Decimal,
    /// Balance assumed when the balance request fails
    #[serde(default = "default_fallback_balance")]
    pub fallback_balance: Decimal,
    /// USDT added to the notional on the single minimum-notional retry
    #[serde(default = "default_retry_notional_increment")]
    pub retry_notional_increment: Decimal,
    /// Leverages tried, in order, when the requested leverage is rejected
    #[serde(default = "default_leverage_fallbacks")]
    pub leverage_fallbacks: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// CoinGecko demo API key
    #[serde(default)]
    pub coingecko_api_key: String,
    /// CoinGecko REST base URL
    #[serde(default = "default_coingecko_url")]
    pub coingecko_base_url: String,
    /// Number of coins requested from CoinGecko
    #[serde(default = "default_market_cap_per_page")]
    pub market_cap_per_page: u32,
    /// CoinGecko request timeout in seconds
    #[serde(default = "default_market_cap_timeout")]
    pub market_cap_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP API binds to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public IP shown to users for API key whitelisting
    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    /// Position stream polling interval in seconds
    #[serde(default = "default_positions_interval")]
    pub positions_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Symbols per trade request
    #[serde(default = "default_trade_batch_size")]
    pub trade_batch_size: usize,
    /// Positions per close request
    #[serde(default = "default_close_batch_size")]
    pub close_batch_size: usize,
}

// Default value functions
fn default_recv_window() -> u64 {
    60_000
}

fn default_leverage() -> u8 {
    50
}

fn default_margin() -> Decimal {
    Decimal::new(3, 0) // 3 USDT
}

fn default_limit() -> usize {
    10
}

fn default_max_balance_fraction() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_fallback_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_retry_notional_increment() -> Decimal {
    Decimal::new(50, 0)
}

fn default_leverage_fallbacks() -> Vec<u8> {
    vec![40, 30, 20, 10]
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_market_cap_per_page() -> u32 {
    200
}

fn default_market_cap_timeout() -> u64 {
    10
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_server_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_positions_interval() -> u64 {
    5
}

fn default_trade_batch_size() -> usize {
    5
}

fn default_close_batch_size() -> usize {
    3
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("DESK")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trading.leverage_fallbacks"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let trading = &self.trading;

        for leverage in [trading.long_leverage, trading.short_leverage] {
            anyhow::ensure!(
                (1..=125).contains(&leverage),
                "leverage must be between 1 and 125, got {}",
                leverage
            );
        }

        anyhow::ensure!(
            trading.long_margin > Decimal::ZERO && trading.short_margin > Decimal::ZERO,
            "margin must be positive"
        );

        anyhow::ensure!(
            trading.max_balance_fraction > Decimal::ZERO
                && trading.max_balance_fraction <= Decimal::ONE,
            "max_balance_fraction must be between 0 and 1"
        );

        anyhow::ensure!(
            self.batch.trade_batch_size > 0 && self.batch.close_batch_size > 0,
            "batch sizes must be positive"
        );

        anyhow::ensure!(
            self.server.positions_interval_secs > 0,
            "positions_interval_secs must be positive"
        );

        Ok(())
    }
}

impl BinanceConfig {
    /// Resolve the key pair to trade with.
    ///
    /// The copy-trading pair wins when copy-trading mode is on and both of its
    /// values are non-empty; otherwise the main pair is used. Returns `None`
    /// when the selected pair is empty.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.copytrading_mode {
            let key = self.copytrading_api_key.trim();
            let secret = self.copytrading_secret_key.trim();
            if !key.is_empty() && !secret.is_empty() {
                return Some(Credentials {
                    api_key: key.to_string(),
                    secret_key: secret.to_string(),
                    mode: AccountMode::Copytrading,
                });
            }
        }

        let key = self.api_key.trim();
        let secret = self.secret_key.trim();
        if key.is_empty() || secret.is_empty() {
            return None;
        }

        Some(Credentials {
            api_key: key.to_string(),
            secret_key: secret.to_string(),
            mode: AccountMode::Main,
        })
    }
}

impl TradingConfig {
    /// Margin and leverage configured for a side.
    pub fn margin_and_leverage(&self, side: PositionSide) -> (Decimal, u8) {
        match side {
            PositionSide::Short => (self.short_margin, self.short_leverage),
            _ => (self.long_margin, self.long_leverage),
        }
    }

    /// Enabled take-profit percentage (positive values only).
    pub fn take_profit_percent(&self) -> Option<Decimal> {
        self.take_profit.filter(|tp| *tp > Decimal::ZERO)
    }

    /// Enabled stop-loss percentage (positive values only).
    pub fn stop_loss_percent(&self) -> Option<Decimal> {
        self.stop_loss.filter(|sl| *sl > Decimal::ZERO)
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            copytrading_mode: false,
            copytrading_api_key: String::new(),
            copytrading_secret_key: String::new(),
            testnet: false,
            base_url: None,
            recv_window: default_recv_window(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            long_leverage: default_leverage(),
            long_margin: default_margin(),
            short_leverage: default_leverage(),
            short_margin: default_margin(),
            take_profit: None,
            stop_loss: None,
            ignored_symbols: String::new(),
            default_limit: default_limit(),
            max_balance_fraction: default_max_balance_fraction(),
            fallback_balance: default_fallback_balance(),
            retry_notional_increment: default_retry_notional_increment(),
            leverage_fallbacks: default_leverage_fallbacks(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            coingecko_api_key: String::new(),
            coingecko_base_url: default_coingecko_url(),
            market_cap_per_page: default_market_cap_per_page(),
            market_cap_timeout_secs: default_market_cap_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            server_ip: default_server_ip(),
            positions_interval_secs: default_positions_interval(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            trade_batch_size: default_trade_batch_size(),
            close_batch_size: default_close_batch_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_leverage() {
        let mut config = Config::default();
        config.trading.short_leverage = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_balance_fraction_above_one() {
        let mut config = Config::default();
        config.trading.max_balance_fraction = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_prefer_copytrading_pair() {
        let config = BinanceConfig {
            api_key: "main-key".to_string(),
            secret_key: "main-secret".to_string(),
            copytrading_mode: true,
            copytrading_api_key: " copy-key ".to_string(),
            copytrading_secret_key: "copy-secret".to_string(),
            ..Default::default()
        };

        let creds = config.credentials().unwrap();
        assert_eq!(creds.api_key, "copy-key");
        assert_eq!(creds.mode, AccountMode::Copytrading);
    }

    #[test]
    fn test_credentials_fall_back_to_main_when_copytrading_empty() {
        let config = BinanceConfig {
            api_key: "main-key".to_string(),
            secret_key: "main-secret".to_string(),
            copytrading_mode: true,
            copytrading_api_key: "   ".to_string(),
            ..Default::default()
        };

        let creds = config.credentials().unwrap();
        assert_eq!(creds.api_key, "main-key");
        assert_eq!(creds.mode, AccountMode::Main);
    }

    #[test]
    fn test_credentials_missing() {
        let config = BinanceConfig {
            api_key: "key-only".to_string(),
            ..Default::default()
        };
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_margin_and_leverage_per_side() {
        let trading = TradingConfig {
            long_margin: dec!(5),
            long_leverage: 20,
            short_margin: dec!(2),
            short_leverage: 10,
            ..Default::default()
        };

        assert_eq!(trading.margin_and_leverage(PositionSide::Long), (dec!(5), 20));
        assert_eq!(trading.margin_and_leverage(PositionSide::Short), (dec!(2), 10));
    }

    #[test]
    fn test_non_positive_tp_sl_disabled() {
        let trading = TradingConfig {
            take_profit: Some(dec!(0)),
            stop_loss: Some(dec!(30)),
            ..Default::default()
        };
        assert_eq!(trading.take_profit_percent(), None);
        assert_eq!(trading.stop_loss_percent(), Some(dec!(30)));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("abcdefghijkl"), "abcdefgh... (12 chars)");
    }
}

//! CoinGecko REST API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::*;
use crate::config::MarketConfig;
use crate::exchange::traits::MarketCapSource;

/// CoinGecko API client for market cap rankings.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: String,
    per_page: u32,
}

impl CoinGeckoClient {
    /// Create a new client from market configuration.
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.market_cap_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.coingecko_base_url.trim_end_matches('/').to_string(),
            api_key: config.coingecko_api_key.clone(),
            per_page: config.market_cap_per_page,
        })
    }
}

#[async_trait]
impl MarketCapSource for CoinGeckoClient {
    #[instrument(skip(self), name = "coingecko_markets")]
    async fn market_caps(&self) -> Result<Vec<CoinMarket>> {
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = self.per_page.to_string();
        let mut query = vec![
            ("vs_currency", "usd"),
            ("order", "market_cap_desc"),
            ("per_page", per_page.as_str()),
            ("page", "1"),
            ("sparkline", "false"),
        ];
        if !self.api_key.is_empty() {
            query.push(("x_cg_demo_api_key", self.api_key.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send coins/markets request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko API error {}: {}", status, body);
        }

        let coins: Vec<CoinMarket> = response
            .json()
            .await
            .context("Failed to parse coins/markets response")?;

        debug!("Fetched {} coins from CoinGecko", coins.len());
        Ok(coins)
    }
}

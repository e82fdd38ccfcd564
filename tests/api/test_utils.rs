//! Test utilities for HTTP API integration tests

use anyhow::Result;
use async_trait::async_trait;
use axum_test::TestServer;
use futures_desk::api::{create_router, AppState};
use futures_desk::config::Config;
use futures_desk::exchange::{CoinMarket, MarketCapSource, MockExchange};
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Fixed CoinGecko listing.
pub struct StaticCaps(pub Vec<CoinMarket>);

#[async_trait]
impl MarketCapSource for StaticCaps {
    async fn market_caps(&self) -> Result<Vec<CoinMarket>> {
        Ok(self.0.clone())
    }
}

pub fn coin(symbol: &str, cap: f64, rank: u32) -> CoinMarket {
    CoinMarket {
        id: symbol.to_lowercase(),
        symbol: symbol.to_lowercase(),
        name: symbol.to_string(),
        market_cap: Some(cap),
        market_cap_rank: Some(rank),
    }
}

/// Test helper wrapping the router around a simulated exchange.
#[allow(dead_code)]
pub struct TestApiServer {
    pub server: TestServer,
    pub exchange: Arc<MockExchange>,
}

impl TestApiServer {
    pub async fn new() -> Self {
        Self::with_credentials(true).await
    }

    pub async fn with_credentials(has_credentials: bool) -> Self {
        let exchange = Arc::new(MockExchange::new(dec!(1000)));
        for (symbol, price, change, volume, min_qty, tick) in [
            ("BTCUSDT", dec!(60000), dec!(1.5), dec!(9000000000), dec!(0.001), dec!(0.1)),
            ("ETHUSDT", dec!(3000), dec!(-2.0), dec!(5000000000), dec!(0.001), dec!(0.01)),
            ("DOGEUSDT", dec!(2.0), dec!(6.5), dec!(900000000), dec!(1), dec!(0.00001)),
        ] {
            exchange.add_symbol(symbol, min_qty, min_qty, dec!(5), tick).await;
            exchange.set_ticker(symbol, price, change, volume).await;
        }

        let caps = StaticCaps(vec![
            coin("BTC", 1.2e12, 1),
            coin("ETH", 4.0e11, 2),
            coin("DOGE", 3.0e10, 8),
        ]);

        let mut config = Config::default();
        config.server.server_ip = "203.0.113.7".to_string();

        let state = AppState::new(exchange.clone(), Arc::new(caps), config, has_credentials);
        let server = TestServer::new(create_router(state)).expect("start test server");

        Self { server, exchange }
    }
}

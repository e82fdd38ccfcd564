//! HTTP API for the dashboard.
//!
//! | route | handler |
//! |---|---|
//! | `GET /health` | liveness and server time |
//! | `GET /api/server/config` | public server IP for API key whitelisting |
//! | `GET /api/binance/market` | ranking lists |
//! | `POST /api/binance/trade` | open a batch |
//! | `POST /api/binance/add-margin` | add to existing positions |
//! | `GET /api/binance/positions` | positions snapshot |
//! | `DELETE /api/binance/positions` | close positions |
//! | `GET /api/binance/positions/sse` | position stream |

mod error;
mod rest;
mod sse;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::config::Config;
use crate::exchange::{FuturesExchange, MarketCapSource};

pub use error::ApiError;
pub use sse::{poll_positions, StreamErrorCode, StreamMessage};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<dyn FuturesExchange>,
    pub market_caps: Arc<dyn MarketCapSource>,
    pub config: Arc<Config>,
    /// Whether signed endpoints can be called
    pub has_credentials: bool,
}

impl AppState {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        market_caps: Arc<dyn MarketCapSource>,
        config: Config,
        has_credentials: bool,
    ) -> Self {
        Self {
            exchange,
            market_caps,
            config: Arc::new(config),
            has_credentials,
        }
    }

    fn require_credentials(&self) -> Result<(), ApiError> {
        if self.has_credentials {
            Ok(())
        } else {
            Err(ApiError::MissingCredentials)
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(rest::health))
        .route("/api/server/config", get(rest::server_config))
        .route("/api/binance/market", get(rest::market))
        .route("/api/binance/trade", post(rest::trade))
        .route("/api/binance/add-margin", post(rest::add_margin))
        .route(
            "/api/binance/positions",
            get(rest::positions).delete(rest::close_positions),
        )
        .route("/api/binance/positions/sse", get(sse::positions_stream))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState) -> Result<()> {
    let bind = state.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("🌐 HTTP API listening on http://{}", bind);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("🛑 Shutdown signal received");
        })
        .await
        .context("HTTP server error")
}

#[cfg(test)]
pub(crate) fn test_state(exchange: Arc<crate::exchange::MockExchange>, has_credentials: bool) -> AppState {
    use crate::exchange::CoinMarket;

    struct NoCaps;

    #[async_trait::async_trait]
    impl MarketCapSource for NoCaps {
        async fn market_caps(&self) -> Result<Vec<CoinMarket>> {
            Ok(Vec::new())
        }
    }

    AppState::new(exchange, Arc::new(NoCaps), Config::default(), has_credentials)
}

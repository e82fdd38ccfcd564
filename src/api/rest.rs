//! REST route handlers.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::error::ApiError;
use super::AppState;
use crate::exchange::PositionSide;
use crate::trading::{
    parse_side, BatchExecutor, CloseFilter, MarketRanker, PositionReader, PositionsSnapshot,
    Rankings, SymbolResult,
};

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    symbols: Option<Vec<String>>,
    side: Option<String>,
}

impl BatchRequest {
    fn validate(self) -> Result<(Vec<String>, PositionSide), ApiError> {
        match (self.symbols, self.side) {
            (Some(symbols), Some(side)) => {
                let side = parse_side(&side).map_err(|_| ApiError::InvalidInput)?;
                Ok((symbols, side))
            }
            _ => Err(ApiError::InvalidInput),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketQuery {
    limit: Option<usize>,
    skip_market_cap: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CloseQuery {
    #[serde(rename = "type")]
    close_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CloseBody {
    symbols: Option<Vec<String>>,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "serverTime": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn server_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "serverIP": state.config.server.server_ip }))
}

pub async fn market(
    State(state): State<AppState>,
    query: Result<Query<MarketQuery>, QueryRejection>,
) -> Result<Json<Rankings>, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::InvalidInput)?;
    let limit = query.limit.unwrap_or(state.config.trading.default_limit);
    let skip_market_cap = query.skip_market_cap.unwrap_or(false);

    let ranker = MarketRanker::new(state.exchange.clone(), state.market_caps.clone());
    let rankings = ranker.rankings(limit, skip_market_cap).await?;
    Ok(Json(rankings))
}

pub async fn trade(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::InvalidInput)?;
    let (symbols, side) = request.validate()?;
    state.require_credentials()?;

    info!(count = symbols.len(), %side, "Trade request");
    let results = executor(&state).open_batch(&symbols, side).await?;
    Ok(results_json(results))
}

pub async fn add_margin(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::InvalidInput)?;
    let (symbols, side) = request.validate()?;
    state.require_credentials()?;

    info!(count = symbols.len(), %side, "Add margin request");
    let results = executor(&state).add_margin(&symbols, side).await?;
    Ok(results_json(results))
}

pub async fn positions(State(state): State<AppState>) -> Result<Json<PositionsSnapshot>, ApiError> {
    state.require_credentials()?;

    let snapshot = PositionReader::new(state.exchange.clone()).snapshot().await?;
    Ok(Json(snapshot))
}

/// Close positions. The JSON body is optional; an unreadable body closes
/// without a symbol filter.
pub async fn close_positions(
    State(state): State<AppState>,
    query: Result<Query<CloseQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::InvalidInput)?;
    let filter: CloseFilter = query
        .close_type
        .as_deref()
        .ok_or(ApiError::InvalidInput)?
        .parse()
        .map_err(|_| ApiError::InvalidInput)?;
    state.require_credentials()?;

    let body: CloseBody = if body.is_empty() {
        CloseBody::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Ignoring unreadable close body");
            CloseBody::default()
        })
    };

    info!(?filter, symbols = ?body.symbols, "Close request");
    let results = executor(&state)
        .close_positions(filter, body.symbols.as_deref())
        .await?;
    Ok(results_json(results))
}

fn executor(state: &AppState) -> BatchExecutor {
    BatchExecutor::new(state.exchange.clone(), state.config.trading.clone())
}

fn results_json(results: Vec<SymbolResult>) -> Json<Value> {
    Json(json!({ "results": results }))
}

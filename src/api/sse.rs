//! Server-sent position stream.
//!
//! Sends `{"type":"connected"}` once, then polls the exchange on a fixed
//! interval until the client goes away. Each tick first validates the API
//! key with a balance request so credential problems surface as readable
//! messages instead of raw exchange errors.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::MISSING_CREDENTIALS;
use super::AppState;
use crate::exchange::credential_failure;
use crate::trading::{PositionReader, PositionsSnapshot};

/// Error code attached to stream errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamErrorCode {
    Named(&'static str),
    Exchange(i64),
}

/// One message on the position stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Connected,
    Positions {
        #[serde(flatten)]
        snapshot: PositionsSnapshot,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<StreamErrorCode>,
    },
}

impl StreamMessage {
    fn into_event(self) -> Event {
        Event::default().json_data(&self).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to encode stream message");
            Event::default().data(r#"{"type":"error","error":"encoding failed"}"#)
        })
    }
}

pub async fn positions_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let period = Duration::from_secs(state.config.server.positions_interval_secs);
    debug!(?period, "Position stream opened");

    let connected = stream::once(async { Ok(StreamMessage::Connected.into_event()) });
    let updates = stream::unfold(
        (state, tokio::time::interval(period)),
        |(state, mut interval)| async move {
            interval.tick().await;
            let message = poll_positions(&state).await;
            Some((Ok(message.into_event()), (state, interval)))
        },
    );

    Sse::new(connected.chain(updates)).keep_alive(KeepAlive::default())
}

/// Produce the next stream message.
pub async fn poll_positions(state: &AppState) -> StreamMessage {
    if !state.has_credentials {
        return StreamMessage::Error {
            error: MISSING_CREDENTIALS.to_string(),
            code: Some(StreamErrorCode::Named("NO_CREDENTIALS")),
        };
    }

    if let Err(e) = state.exchange.account_balance().await {
        let (error, code) = credential_failure(&e);
        warn!(error = %e, "API key validation failed");
        return StreamMessage::Error {
            error,
            code: code.map(StreamErrorCode::Exchange),
        };
    }

    match PositionReader::new(state.exchange.clone()).snapshot().await {
        Ok(snapshot) => StreamMessage::Positions { snapshot },
        Err(e) => {
            warn!(error = %e, "Failed to read positions");
            StreamMessage::Error {
                error: format!("{:#}", e),
                code: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::exchange::{MockExchange, PositionSide};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_message_shapes() {
        assert_eq!(
            serde_json::to_value(StreamMessage::Connected).unwrap(),
            json!({"type": "connected"})
        );

        let error = StreamMessage::Error {
            error: "API Key 无效，请检查您的 API 密钥配置".to_string(),
            code: Some(StreamErrorCode::Exchange(-2008)),
        };
        assert_eq!(
            serde_json::to_value(error).unwrap(),
            json!({"type": "error", "error": "API Key 无效，请检查您的 API 密钥配置", "code": -2008})
        );
    }

    /// Read `count` events from an SSE response body as JSON payloads.
    async fn read_events(response: axum::response::Response, count: usize) -> Vec<serde_json::Value> {
        let mut body = response.into_body().into_data_stream();
        let mut text = String::new();
        while text.matches("\n\n").count() < count {
            let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
                .await
                .expect("stream stalled")
                .expect("stream ended")
                .unwrap();
            text.push_str(std::str::from_utf8(&chunk).unwrap());
        }

        text.split("\n\n")
            .filter(|event| event.starts_with("data: "))
            .take(count)
            .map(|event| serde_json::from_str(&event["data: ".len()..]).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_stream_sends_connected_then_positions() {
        use axum::response::IntoResponse;

        let exchange = Arc::new(MockExchange::new(dec!(250)));
        exchange.set_price("SOLUSDT", dec!(150)).await;
        exchange
            .open_position("SOLUSDT", PositionSide::Short, dec!(2), dec!(160), 10)
            .await;
        let state = test_state(exchange, true);

        let response = positions_stream(State(state)).await.into_response();
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let events = read_events(response, 2).await;
        assert_eq!(events[0], json!({"type": "connected"}));
        assert_eq!(events[1]["type"], "positions");
        assert_eq!(events[1]["walletBalance"], json!(250.0));
        assert_eq!(events[1]["positions"][0]["symbol"], "SOLUSDT");
        assert_eq!(events[1]["positions"][0]["side"], "SHORT");
        assert_eq!(events[1]["positions"][0]["pnl"], json!(20.0));
    }

    #[tokio::test]
    async fn test_stream_reports_missing_credentials() {
        use axum::response::IntoResponse;

        let state = test_state(Arc::new(MockExchange::new(dec!(100))), false);
        let response = positions_stream(State(state)).await.into_response();

        let events = read_events(response, 2).await;
        assert_eq!(events[0], json!({"type": "connected"}));
        assert_eq!(
            events[1],
            json!({"type": "error", "error": MISSING_CREDENTIALS, "code": "NO_CREDENTIALS"})
        );
    }

    #[tokio::test]
    async fn test_poll_without_credentials() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        let state = test_state(exchange, false);

        match poll_positions(&state).await {
            StreamMessage::Error { error, code } => {
                assert_eq!(error, MISSING_CREDENTIALS);
                assert_eq!(code, Some(StreamErrorCode::Named("NO_CREDENTIALS")));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_maps_invalid_key() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_balance_failure(true).await;
        let state = test_state(exchange, true);

        match poll_positions(&state).await {
            StreamMessage::Error { error, code } => {
                assert_eq!(error, "API Key 无效，请检查您的 API 密钥配置");
                assert_eq!(code, Some(StreamErrorCode::Exchange(-2008)));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_positions() {
        let exchange = Arc::new(MockExchange::new(dec!(250)));
        exchange.set_price("SOLUSDT", dec!(150)).await;
        exchange
            .open_position("SOLUSDT", PositionSide::Long, dec!(2), dec!(140), 10)
            .await;
        let state = test_state(exchange, true);

        let message = poll_positions(&state).await;
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(value["type"], "positions");
        assert_eq!(value["walletBalance"], json!(250.0));
        assert_eq!(value["positions"][0]["symbol"], "SOLUSDT");
        assert_eq!(value["positions"][0]["pnl"], json!(20.0));
    }
}

//! Binance USDT-M futures REST client.

use crate::config::{BinanceConfig, Credentials};
use crate::exchange::error::ExchangeError;
use crate::exchange::traits::FuturesExchange;
use crate::exchange::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, instrument};

const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Binance API client for the USDT-M futures market.
pub struct BinanceClient {
    http: Client,
    credentials: Option<Credentials>,
    base_url: String,
    recv_window: u64,
}

impl BinanceClient {
    /// Create a new Binance client from configuration.
    ///
    /// Without credentials the client can still serve public market data.
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let base_url = match (&config.base_url, config.testnet) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, true) => FUTURES_TESTNET_URL.to_string(),
            (None, false) => FUTURES_BASE_URL.to_string(),
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            credentials: config.credentials(),
            base_url,
            recv_window: config.recv_window,
        })
    }

    /// Whether signed endpoints can be called.
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(secret_key: &str, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current timestamp in milliseconds.
    fn timestamp() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn encode_params(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Turn a non-success response into a typed exchange error.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(payload) => ExchangeError::Api {
                status: status.as_u16(),
                code: payload.code,
                msg: payload.msg,
            },
            Err(_) => ExchangeError::Http {
                status: status.as_u16(),
                body,
            },
        };
        Err(error.into())
    }

    // ==================== Request helpers ====================

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&Self::encode_params(params));
        }

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", what))?;

        Self::check(response)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        what: &str,
    ) -> Result<T> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ExchangeError::MissingCredentials)?;

        params.push(("recvWindow", self.recv_window.to_string()));
        params.push(("timestamp", Self::timestamp().to_string()));

        let query_string = Self::encode_params(&params);
        let signature = Self::sign(&credentials.secret_key, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await
            .with_context(|| format!("Failed to {}", what))?;

        Self::check(response)
            .await
            .with_context(|| format!("Failed to {}", what))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

#[async_trait]
impl FuturesExchange for BinanceClient {
    // ==================== Market Data (Public) ====================

    #[instrument(skip(self))]
    async fn exchange_info(&self) -> Result<FuturesExchangeInfo> {
        self.public_get("/fapi/v1/exchangeInfo", &[], "exchange info")
            .await
    }

    #[instrument(skip(self))]
    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>> {
        self.public_get("/fapi/v1/ticker/24hr", &[], "24h tickers")
            .await
    }

    #[instrument(skip(self))]
    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: TickerPrice = self
            .public_get(
                "/fapi/v1/ticker/price",
                &[("symbol", symbol.to_string())],
                "ticker price",
            )
            .await?;
        Ok(ticker.price)
    }

    // ==================== Account (Authenticated) ====================

    #[instrument(skip(self))]
    async fn account_balance(&self) -> Result<Vec<AccountBalance>> {
        self.signed(Method::GET, "/fapi/v2/balance", Vec::new(), "fetch account balance")
            .await
    }

    #[instrument(skip(self))]
    async fn positions(&self) -> Result<Vec<Position>> {
        self.signed(Method::GET, "/fapi/v3/positionRisk", Vec::new(), "fetch positions")
            .await
    }

    #[instrument(skip(self))]
    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<()> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];

        let _: serde_json::Value = self
            .signed(Method::POST, "/fapi/v1/leverage", params, "set leverage")
            .await?;

        Ok(())
    }

    // ==================== Orders (Authenticated) ====================

    #[instrument(skip(self))]
    async fn place_order(&self, order: &NewOrder) -> Result<OrderResponse> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.order_type.as_str().to_string()),
        ];

        if let Some(position_side) = &order.position_side {
            params.push(("positionSide", position_side.to_string()));
        }

        if let Some(qty) = &order.quantity {
            params.push(("quantity", qty.normalize().to_string()));
        }

        if let Some(reduce_only) = order.reduce_only {
            params.push(("reduceOnly", reduce_only.to_string()));
        }

        if let Some(client_id) = &order.new_client_order_id {
            params.push(("newClientOrderId", client_id.clone()));
        }

        debug!("Placing futures order: {:?}", order);

        self.signed(Method::POST, "/fapi/v1/order", params, "place futures order")
            .await
    }

    #[instrument(skip(self))]
    async fn place_conditional_order(&self, order: &ConditionalOrder) -> Result<AlgoOrderResponse> {
        let params = vec![
            ("algoType", "CONDITIONAL".to_string()),
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("positionSide", order.position_side.to_string()),
            ("type", order.order_type.as_str().to_string()),
            ("triggerPrice", order.trigger_price.normalize().to_string()),
            ("closePosition", order.close_position.to_string()),
            ("workingType", "CONTRACT_PRICE".to_string()),
        ];

        debug!("Placing conditional order: {:?}", order);

        self.signed(Method::POST, "/fapi/v1/algoOrder", params, "place conditional order")
            .await
    }

    #[instrument(skip(self))]
    async fn open_conditional_orders(&self) -> Result<Vec<AlgoOrder>> {
        self.signed(
            Method::GET,
            "/fapi/v1/openAlgoOrders",
            Vec::new(),
            "fetch open conditional orders",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::error::is_notional_rejection;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, with_keys: bool) -> BinanceClient {
        let config = BinanceConfig {
            api_key: if with_keys { "test-key".to_string() } else { String::new() },
            secret_key: if with_keys { "test-secret".to_string() } else { String::new() },
            base_url: Some(server.uri()),
            ..Default::default()
        };
        BinanceClient::new(&config).unwrap()
    }

    #[test]
    fn test_signature_is_hex_hmac() {
        // Example from the Binance API documentation
        let signature = BinanceClient::sign(
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559",
        );
        assert_eq!(
            signature,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[tokio::test]
    async fn test_ticker_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/ticker/price"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "BTCUSDT",
                "price": "64250.10",
                "time": 1700000000000i64
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let price = client.ticker_price("BTCUSDT").await.unwrap();
        assert_eq!(price, dec!(64250.10));
    }

    #[tokio::test]
    async fn test_signed_request_sends_api_key_and_signature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/balance"))
            .and(header("X-MBX-APIKEY", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "accountAlias": "SgsR",
                    "asset": "USDT",
                    "balance": "122.607",
                    "crossWalletBalance": "122.607",
                    "crossUnPnl": "0.0",
                    "availableBalance": "100.5",
                    "maxWithdrawAmount": "100.5"
                }
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let balances = client.account_balance().await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].available_balance, dec!(100.5));

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("recvWindow=60000"));
        assert!(query.contains("signature="));
    }

    #[tokio::test]
    async fn test_signed_request_without_keys_fails_fast() {
        let server = MockServer::start().await;
        let client = client_for(&server, false);

        let err = client.positions().await.unwrap_err();
        assert!(err.downcast_ref::<ExchangeError>().is_some());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_rejection_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .and(query_param("positionSide", "LONG"))
            .and(query_param("quantity", "75"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": -4164,
                "msg": "Order's notional must be no smaller than 5 (unless you choose reduce only)."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let order = NewOrder::market("DOGEUSDT", OrderSide::Buy, PositionSide::Long, dec!(75.000));
        let err = client.place_order(&order).await.unwrap_err();

        let exchange_error = err
            .chain()
            .find_map(|c| c.downcast_ref::<ExchangeError>())
            .unwrap();
        assert_eq!(exchange_error.code(), Some(-4164));
        assert!(is_notional_rejection(&err));
    }

    #[tokio::test]
    async fn test_conditional_order_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/algoOrder"))
            .and(query_param("algoType", "CONDITIONAL"))
            .and(query_param("type", "TAKE_PROFIT_MARKET"))
            .and(query_param("triggerPrice", "2.01"))
            .and(query_param("closePosition", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "algoId": 42,
                "clientAlgoId": "abc",
                "algoType": "CONDITIONAL",
                "orderType": "TAKE_PROFIT_MARKET",
                "symbol": "DOGEUSDT",
                "algoStatus": "NEW"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let order = ConditionalOrder {
            symbol: "DOGEUSDT".to_string(),
            side: OrderSide::Sell,
            position_side: PositionSide::Long,
            order_type: OrderType::TakeProfitMarket,
            trigger_price: dec!(2.0100),
            close_position: true,
        };

        let response = client.place_conditional_order(&order).await.unwrap();
        assert_eq!(response.algo_id, 42);
    }

    #[tokio::test]
    async fn test_leverage_rejection_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/leverage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": -4028,
                "msg": "Leverage 50 is not valid"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        assert!(client.set_leverage("BTCDOMUSDT", 50).await.is_err());
    }
}

//! Bitfinex v1 REST client.
//!
//! Every authenticated call posts a JSON payload containing the request
//! path and a fresh, strictly increasing nonce, signed with HMAC-SHA256
//! over the exact body bytes and sent via `X-BFX-*` headers. Public
//! endpoints (the ticker used for conversion rates) skip authentication
//! and use their own rate limiter.
//!
//! Non-success responses become [`RestError::Request`] carrying status
//! code and body — callers treat them as non-retryable at this layer.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use coral_core::signing::sign_payload;

use crate::rate_limiter::RateLimiter;

/// Monotonically increasing nonce, seeded from the wall clock.
///
/// Concurrent callers each draw a distinct, strictly larger value; the
/// wall clock only ever pushes the sequence forward after restarts.
#[derive(Debug)]
pub struct Nonce(AtomicU64);

impl Nonce {
    /// Seed from current wall-clock milliseconds.
    pub fn new() -> Self {
        Self(AtomicU64::new(chrono::Utc::now().timestamp_millis() as u64))
    }

    /// Next nonce: `max(previous + 1, now_millis)`.
    pub fn next(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis() as u64;
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .map(|prev| now.max(prev + 1))
            .unwrap_or(now)
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

/// REST request failures.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The venue answered with a non-success status.
    #[error("request failed: [{status}] {message}; body: {body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// What was being attempted.
        message: String,
        /// Response body, verbatim, for diagnostics.
        body: String,
    },
    /// The response body did not match the expected shape.
    #[error("failed to decode response for {message}: {detail}; body: {body}")]
    Decode {
        /// What was being attempted.
        message: String,
        /// Parser error.
        detail: String,
        /// Response body, verbatim.
        body: String,
    },
}

/// Order placement / status response.
///
/// The venue reports the assigned id as `order_id` on placement and `id`
/// on status objects; [`OrderResponse::broker_id`] folds the two.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    /// Order id on status/cancel responses.
    #[serde(default)]
    pub id: i64,
    /// Order id on placement responses.
    #[serde(default)]
    pub order_id: i64,
    /// Pair.
    #[serde(default)]
    pub symbol: String,
    /// Submitted price.
    #[serde(default)]
    pub price: String,
    /// Average execution price so far.
    #[serde(default)]
    pub avg_execution_price: String,
    /// "buy" or "sell".
    #[serde(default)]
    pub side: String,
    /// Venue order-type string.
    #[serde(default, rename = "type")]
    pub order_type: String,
    /// Still resting on the book.
    #[serde(default)]
    pub is_live: bool,
    /// Canceled.
    #[serde(default)]
    pub is_cancelled: bool,
    /// Originally requested amount.
    #[serde(default)]
    pub original_amount: String,
    /// Amount still open.
    #[serde(default)]
    pub remaining_amount: String,
    /// Amount executed so far.
    #[serde(default)]
    pub executed_amount: String,
}

impl OrderResponse {
    /// The broker-assigned id, whichever field carried it. Zero means the
    /// venue assigned none — an invalid placement.
    pub fn broker_id(&self) -> i64 {
        if self.order_id != 0 {
            self.order_id
        } else {
            self.id
        }
    }

    /// `true` when the response already reports complete execution
    /// (market order filled in the placement round-trip).
    pub fn is_fully_executed(&self) -> bool {
        let remaining = self.remaining_amount.trim().parse::<f64>().unwrap_or(f64::NAN);
        let executed = self.executed_amount.trim().parse::<f64>().unwrap_or(0.0);
        remaining == 0.0 && executed > 0.0
    }
}

/// One wallet entry from `/v1/balances`.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Wallet name ("exchange", "trading", "deposit").
    #[serde(default, rename = "type")]
    pub wallet: String,
    /// Currency code.
    #[serde(default)]
    pub currency: String,
    /// Total amount.
    #[serde(default)]
    pub amount: String,
    /// Amount not locked in orders.
    #[serde(default)]
    pub available: String,
}

/// One position from `/v1/positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionResponse {
    /// Position id.
    #[serde(default)]
    pub id: i64,
    /// Pair.
    #[serde(default)]
    pub symbol: String,
    /// Position status.
    #[serde(default)]
    pub status: String,
    /// Signed position size.
    #[serde(default)]
    pub amount: String,
    /// Average entry price.
    #[serde(default)]
    pub base: String,
    /// Unrealized profit/loss.
    #[serde(default)]
    pub pl: String,
}

/// Public ticker response, used for conversion-rate lookups.
#[derive(Debug, Clone, Deserialize)]
pub struct PubTickerResponse {
    /// Midpoint between bid and ask.
    #[serde(default)]
    pub mid: String,
    /// Best bid.
    #[serde(default)]
    pub bid: String,
    /// Best ask.
    #[serde(default)]
    pub ask: String,
    /// Last trade price.
    #[serde(default)]
    pub last_price: String,
}

/// Bitfinex v1 REST client with per-endpoint-group rate limiting.
pub struct BitfinexRestClient {
    base_url: String,
    api_key: String,
    api_secret: String,
    client: Client,
    auth_limiter: RateLimiter,
    public_limiter: RateLimiter,
    nonce: Nonce,
}

impl BitfinexRestClient {
    /// Create a client for `base_url` with the account credentials.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            client: Client::new(),
            auth_limiter: RateLimiter::authenticated_default(),
            public_limiter: RateLimiter::public_default(),
            nonce: Nonce::new(),
        }
    }

    /// Place a new order. `amount` and `price` are wire-unit decimal
    /// strings; `side` is "buy"/"sell"; `order_type` a venue type string.
    pub async fn new_order(
        &self,
        symbol: &str,
        amount: &str,
        price: &str,
        side: &str,
        order_type: &str,
    ) -> Result<OrderResponse, RestError> {
        self.authed(
            "/v1/order/new",
            serde_json::json!({
                "symbol": symbol.to_lowercase(),
                "amount": amount,
                "price": price,
                "exchange": "bitfinex",
                "side": side,
                "type": order_type,
            }),
        )
        .await
    }

    /// Cancel a single order by broker id.
    pub async fn cancel_order(&self, order_id: i64) -> Result<OrderResponse, RestError> {
        self.authed("/v1/order/cancel", serde_json::json!({ "order_id": order_id }))
            .await
    }

    /// Cancel-replace: atomically cancel `order_id` and submit a
    /// replacement, yielding a fresh broker id.
    #[allow(clippy::too_many_arguments)]
    pub async fn cancel_replace(
        &self,
        order_id: i64,
        symbol: &str,
        amount: &str,
        price: &str,
        side: &str,
        order_type: &str,
    ) -> Result<OrderResponse, RestError> {
        self.authed(
            "/v1/order/cancel/replace",
            serde_json::json!({
                "order_id": order_id,
                "symbol": symbol.to_lowercase(),
                "amount": amount,
                "price": price,
                "exchange": "bitfinex",
                "side": side,
                "type": order_type,
            }),
        )
        .await
    }

    /// Every order still resting on the book.
    pub async fn active_orders(&self) -> Result<Vec<OrderResponse>, RestError> {
        self.authed("/v1/orders", serde_json::json!({})).await
    }

    /// Every open margin position.
    pub async fn active_positions(&self) -> Result<Vec<PositionResponse>, RestError> {
        self.authed("/v1/positions", serde_json::json!({})).await
    }

    /// Every wallet balance.
    pub async fn balances(&self) -> Result<Vec<BalanceResponse>, RestError> {
        self.authed("/v1/balances", serde_json::json!({})).await
    }

    /// Public ticker for a pair; unauthenticated, public rate limiter.
    pub async fn ticker(&self, symbol: &str) -> Result<PubTickerResponse, RestError> {
        self.public_limiter.acquire(1).await;
        let path = format!("/v1/pubticker/{}", symbol.to_lowercase());
        let url = format!("{}{}", self.base_url, path);

        debug!(path = %path, "public GET");
        let resp = self.client.get(&url).send().await?;
        Self::handle(resp, &path).await
    }

    /// Sign and send one authenticated request.
    async fn authed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut params: Value,
    ) -> Result<T, RestError> {
        self.auth_limiter.acquire(1).await;

        params["request"] = Value::from(path);
        params["nonce"] = Value::from(self.nonce.next().to_string());
        let body = params.to_string();
        let signature = sign_payload(&self.api_secret, &body);

        debug!(path = %path, "signed POST");
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("X-BFX-APIKEY", &self.api_key)
            .header("X-BFX-SIGNATURE", signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        Self::handle(resp, path).await
    }

    /// Map a response into the target type or a [`RestError`] carrying
    /// status and body.
    async fn handle<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        path: &str,
    ) -> Result<T, RestError> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(RestError::Request {
                status: status.as_u16(),
                message: path.to_string(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RestError::Decode {
            message: path.to_string(),
            detail: e.to_string(),
            body,
        })
    }
}

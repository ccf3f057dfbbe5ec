//! Bitfinex streaming session.
//!
//! [`BitfinexStream`] composes the generic [`WsConnection`] loop with the
//! venue protocol: signed authentication, ticker subscription replay,
//! hard/soft reset handling, and routing of decoded messages to the
//! channel registry, tick buffer, wallet store, and fill reconciler.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::SinkExt;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use coral_core::config::AppConfig;
use coral_core::scaling::ScaleCodec;
use coral_core::signing::sign_payload;
use coral_core::types::{Price, Quantity, Symbol, Tick, Timestamp, Venue, WalletBalance};
use coral_oms::FillReconciler;

use crate::channels::{ChannelKind, ChannelRegistry};
use crate::decoder::{decode, StreamMessage, TickerFrame};
use crate::tick_buffer::TickBuffer;
use crate::ws::{Directive, ReconnectConfig, SessionState, StreamHandler, WsConnection, WsSink};

/// Everything the streaming session needs to run.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// API key for the auth frame.
    pub api_key: String,
    /// API secret the auth payload is signed with.
    pub api_secret: String,
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Symbols to subscribe to.
    pub symbols: Vec<Symbol>,
    /// Venue scale factor, fixed per connection.
    pub scale_factor: u32,
    /// Reconnect and liveness parameters.
    pub reconnect: ReconnectConfig,
}

impl StreamSettings {
    /// Build settings from the loaded application configuration.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            api_key: cfg.bitfinex.api_key.clone(),
            api_secret: cfg.bitfinex.api_secret.clone(),
            ws_url: cfg.bitfinex.ws_url.clone(),
            symbols: cfg.stream.symbols.iter().map(Symbol::new).collect(),
            scale_factor: cfg.bitfinex.scale_factor,
            reconnect: ReconnectConfig {
                initial_backoff: std::time::Duration::from_millis(
                    cfg.stream.reconnect.initial_backoff_ms,
                ),
                max_backoff: std::time::Duration::from_millis(cfg.stream.reconnect.max_backoff_ms),
                max_retries: cfg.stream.reconnect.max_retries,
                liveness_timeout: std::time::Duration::from_millis(cfg.stream.heartbeat_timeout_ms),
            },
        }
    }
}

/// Shared holder of the latest wallet snapshot.
///
/// Wallet messages are full snapshots; each one replaces the entire set
/// atomically.
#[derive(Debug, Default)]
pub struct WalletStore {
    balances: parking_lot::RwLock<Vec<WalletBalance>>,
}

impl WalletStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole balance set.
    pub fn replace(&self, balances: Vec<WalletBalance>) {
        *self.balances.write() = balances;
    }

    /// Snapshot of every balance.
    pub fn snapshot(&self) -> Vec<WalletBalance> {
        self.balances.read().clone()
    }

    /// Balance for one currency, if reported.
    pub fn balance_of(&self, currency: &str) -> Option<Price> {
        self.balances
            .read()
            .iter()
            .find(|b| b.currency.eq_ignore_ascii_case(currency))
            .map(|b| b.balance)
    }
}

/// The streaming session: owns connect/disconnect and the routing of
/// decoded frames.
pub struct BitfinexStream {
    settings: StreamSettings,
    registry: Arc<ChannelRegistry>,
    ticks: Arc<TickBuffer>,
    wallets: Arc<WalletStore>,
    reconciler: Arc<FillReconciler>,
    state_tx: watch::Sender<SessionState>,
    shutdown_tx: watch::Sender<bool>,
}

impl BitfinexStream {
    /// Create a session over the shared registry, tick buffer, wallet
    /// store, and reconciler.
    pub fn new(
        settings: StreamSettings,
        registry: Arc<ChannelRegistry>,
        ticks: Arc<TickBuffer>,
        wallets: Arc<WalletStore>,
        reconciler: Arc<FillReconciler>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            registry,
            ticks,
            wallets,
            reconciler,
            state_tx,
            shutdown_tx,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.subscribe().borrow()
    }

    /// Watch channel for session-state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Request an orderly shutdown. Idempotent: disconnecting an already
    /// disconnected session is a no-op.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Drive the session until [`disconnect`](Self::disconnect) or a
    /// fatal error (authentication rejection is fatal and is not retried;
    /// the caller must invoke `run` again deliberately).
    pub async fn run(&self) -> anyhow::Result<()> {
        let codec = ScaleCodec::new(self.settings.scale_factor)?;
        let conn = WsConnection::new(
            self.settings.ws_url.clone(),
            self.settings.reconnect.clone(),
        );
        let mut handler = SessionHandler {
            api_key: self.settings.api_key.clone(),
            api_secret: self.settings.api_secret.clone(),
            configured: self.settings.symbols.clone(),
            captured: Vec::new(),
            pending: HashSet::new(),
            registry: self.registry.clone(),
            ticks: self.ticks.clone(),
            wallets: self.wallets.clone(),
            reconciler: self.reconciler.clone(),
            codec,
            state_tx: self.state_tx.clone(),
            state: SessionState::Disconnected,
        };
        conn.run(&mut handler, self.shutdown_tx.subscribe()).await
    }
}

/// What routing a decoded message asks of the frame loop.
#[derive(Debug, PartialEq)]
enum Routed {
    /// Nothing further.
    Done,
    /// Authentication acked: subscription replay must be sent.
    SendSubscriptions,
    /// Steer the connection loop.
    Steer(Directive),
}

struct SessionHandler {
    api_key: String,
    api_secret: String,
    /// The configured symbol universe, used when nothing was tracked yet.
    configured: Vec<Symbol>,
    /// Symbols captured before a hard reset, replayed on reconnect.
    captured: Vec<Symbol>,
    /// Symbols awaiting a subscription ack.
    pending: HashSet<Symbol>,
    registry: Arc<ChannelRegistry>,
    ticks: Arc<TickBuffer>,
    wallets: Arc<WalletStore>,
    reconciler: Arc<FillReconciler>,
    codec: ScaleCodec,
    state_tx: watch::Sender<SessionState>,
    state: SessionState,
}

impl SessionHandler {
    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::info!(from = ?self.state, to = ?state, "session state");
            self.state = state;
            let _ = self.state_tx.send(state);
        }
    }

    /// Symbols to (re)subscribe: whatever the registry tracked, or the
    /// configured universe when the registry is empty.
    fn capture_symbols(&self) -> Vec<Symbol> {
        let tracked = self.registry.symbols_of(ChannelKind::Ticker);
        if tracked.is_empty() {
            self.configured.clone()
        } else {
            tracked
        }
    }

    async fn send_auth(&mut self, sink: &mut WsSink) -> anyhow::Result<()> {
        let nonce = chrono::Utc::now().timestamp_millis();
        let payload = format!("AUTH{nonce}");
        let frame = serde_json::json!({
            "event": "auth",
            "apiKey": self.api_key,
            "authSig": sign_payload(&self.api_secret, &payload),
            "authPayload": payload,
        });
        sink.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    async fn send_subscriptions(&mut self, sink: &mut WsSink) -> anyhow::Result<()> {
        let mut symbols: Vec<Symbol> = self.pending.iter().cloned().collect();
        symbols.sort_by(|a, b| a.0.cmp(&b.0));
        for symbol in symbols {
            let frame = serde_json::json!({
                "event": "subscribe",
                "channel": "ticker",
                "pair": symbol.0,
            });
            sink.send(Message::Text(frame.to_string())).await?;
        }
        Ok(())
    }

    /// Route one decoded message. Everything that does not need the sink
    /// happens here.
    fn route(&mut self, decoded: StreamMessage) -> Routed {
        match decoded {
            StreamMessage::Heartbeat { channel_id } => {
                tracing::trace!(channel_id, "heartbeat");
                Routed::Done
            }
            StreamMessage::Trade(execution) => {
                self.reconciler.on_execution(&execution);
                Routed::Done
            }
            StreamMessage::WalletSnapshot(balances) => {
                if !balances.is_empty() {
                    self.wallets.replace(balances);
                }
                Routed::Done
            }
            StreamMessage::Ticker { symbol, frame, .. } => {
                self.push_tick(symbol, frame);
                Routed::Done
            }
            StreamMessage::Subscribed { channel_id, symbol } => {
                self.on_subscribed(channel_id, symbol);
                Routed::Done
            }
            StreamMessage::AuthAck => {
                tracing::info!("authenticated");
                self.set_state(SessionState::Subscribing);
                Routed::SendSubscriptions
            }
            StreamMessage::AuthFailure => {
                Routed::Steer(Directive::Fatal("authentication rejected by venue".to_string()))
            }
            StreamMessage::HardReset => Routed::Steer(Directive::HardReset),
            StreamMessage::SoftReset => Routed::Steer(Directive::SoftReset),
            StreamMessage::Ignored => Routed::Done,
        }
    }

    fn on_subscribed(&mut self, channel_id: u32, symbol: Option<Symbol>) {
        let symbol = match symbol {
            Some(s) => s,
            // Some acks omit the pair; unambiguous only while exactly one
            // subscription is outstanding.
            None if self.pending.len() == 1 => self.pending.iter().next().cloned().unwrap(),
            None => {
                tracing::warn!(channel_id, "subscription ack without pair; dropping");
                return;
            }
        };
        self.registry
            .register(channel_id, ChannelKind::Ticker, symbol.clone());
        self.pending.remove(&symbol);
        if self.state == SessionState::Subscribing && self.pending.is_empty() {
            self.set_state(SessionState::Live);
        }
    }

    fn push_tick(&mut self, symbol: Symbol, frame: TickerFrame) {
        let prev = self.ticks.get(&symbol);
        let codec = self.codec;

        let price = |field: Option<Price>, prior: Option<Price>| {
            field
                .map(|p| codec.scale_price(p))
                .or(prior)
                .unwrap_or_else(|| Price::zero(0))
        };
        let qty = |field: Option<Quantity>, prior: Option<Quantity>| {
            field
                .map(|q| codec.scale_quantity(q))
                .or(prior)
                .unwrap_or_else(|| Quantity::zero(0))
        };

        let tick = Tick {
            venue: Venue::Bitfinex,
            symbol: symbol.clone(),
            bid: price(frame.bid, prev.as_ref().map(|t| t.bid)),
            ask: price(frame.ask, prev.as_ref().map(|t| t.ask)),
            bid_size: qty(frame.bid_size, prev.as_ref().map(|t| t.bid_size)),
            ask_size: qty(frame.ask_size, prev.as_ref().map(|t| t.ask_size)),
            last: price(frame.last, prev.as_ref().map(|t| t.last)),
            volume: qty(frame.volume, prev.as_ref().map(|t| t.volume)),
            high: price(frame.high, prev.as_ref().map(|t| t.high)),
            low: price(frame.low, prev.as_ref().map(|t| t.low)),
            timestamp: Timestamp::now(),
        };
        self.ticks.push(tick);
    }
}

#[async_trait::async_trait]
impl StreamHandler for SessionHandler {
    async fn on_connect(&mut self, sink: &mut WsSink) -> anyhow::Result<()> {
        // Channel ids from any previous connection are void.
        if self.captured.is_empty() {
            self.captured = self.capture_symbols();
        }
        self.registry.clear();
        self.pending = self.captured.drain(..).collect();
        self.set_state(SessionState::Authenticating);
        self.send_auth(sink).await
    }

    async fn on_frame(&mut self, msg: Message, sink: &mut WsSink) -> anyhow::Result<Directive> {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(frame) => {
                tracing::info!(frame = ?frame, "close frame received");
                return Ok(Directive::Continue);
            }
            // Pings are answered by the transport.
            _ => return Ok(Directive::Continue),
        };

        let decoded = match decode(&text, &self.registry) {
            Ok(message) => message,
            Err(e) => {
                // Deliberately dropped, never silently: the error carries
                // the raw payload.
                tracing::warn!(error = %e, "dropping undecodable frame");
                return Ok(Directive::Continue);
            }
        };

        match self.route(decoded) {
            Routed::Done => Ok(Directive::Continue),
            Routed::Steer(directive) => Ok(directive),
            Routed::SendSubscriptions => {
                self.send_subscriptions(sink).await?;
                if self.pending.is_empty() {
                    self.set_state(SessionState::Live);
                }
                Ok(Directive::Continue)
            }
        }
    }

    async fn on_soft_reset(&mut self, sink: &mut WsSink) -> anyhow::Result<()> {
        tracing::info!("soft reset: re-authenticating and replaying subscriptions");
        sink.send(Message::Text(
            serde_json::json!({"event": "unauth"}).to_string(),
        ))
        .await?;
        // Keep the registry: fresh acks supersede old ids per symbol, so
        // history is not cleared prematurely.
        self.pending = self.capture_symbols().into_iter().collect();
        self.set_state(SessionState::Authenticating);
        self.send_auth(sink).await
    }

    fn on_hard_reset(&mut self) {
        self.captured = self.capture_symbols();
        self.registry.clear();
    }

    fn on_state_change(&mut self, state: SessionState) {
        self.set_state(state);
    }
}

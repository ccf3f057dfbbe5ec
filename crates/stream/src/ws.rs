//! Reconnecting WebSocket session loop.
//!
//! [`WsConnection`] owns connect/reconnect mechanics: exponential backoff
//! with jitter, a liveness window that forces a reconnect when no frame
//! (heartbeats included) arrives in time, and an idempotent shutdown
//! signal. Protocol behavior — authentication, subscription replay, frame
//! handling — is delegated to a [`StreamHandler`], which steers the loop
//! through the [`Directive`] it returns per frame.
//!
//! The read loop is the single consumer of inbound frames, and a hard
//! reset leaves it before the socket reopens, so a second reset signal
//! arriving mid-reconnect is never observed: reconnects are serialized
//! and coalesced by construction.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Sink half of the socket, used to send frames.
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Stream half of the socket, used to receive frames.
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket; the resting and final state.
    Disconnected,
    /// Socket being opened.
    Connecting,
    /// Socket open, auth frame sent, awaiting the ack.
    Authenticating,
    /// Authenticated, awaiting subscription acks.
    Subscribing,
    /// All prior symbols resubscribed; fully operational.
    Live,
    /// Between a drop (or hard reset) and the next connect attempt.
    Reconnecting,
}

/// What the handler wants the loop to do after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Keep reading.
    Continue,
    /// Re-authenticate and resubscribe on the live socket.
    SoftReset,
    /// Drop the socket and re-handshake from scratch.
    HardReset,
    /// Unrecoverable (e.g. authentication rejected): stop without retry.
    Fatal(String),
}

/// Reconnect and liveness parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Attempts before giving up (0 = unlimited).
    pub max_retries: u32,
    /// Reconnect when no frame arrives within this window.
    pub liveness_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retries: 0, // unlimited
            liveness_timeout: Duration::from_secs(30),
        }
    }
}

/// Venue-specific protocol behavior plugged into [`WsConnection::run`].
#[async_trait::async_trait]
pub trait StreamHandler: Send + 'static {
    /// Called on every (re)connect with a fresh sink. Sends the auth
    /// frame; subscription replay follows the auth ack in `on_frame`.
    async fn on_connect(&mut self, sink: &mut WsSink) -> anyhow::Result<()>;

    /// Handle one inbound frame; the returned directive steers the loop.
    async fn on_frame(&mut self, msg: Message, sink: &mut WsSink) -> anyhow::Result<Directive>;

    /// Re-authenticate and resubscribe on the live socket (soft reset).
    async fn on_soft_reset(&mut self, sink: &mut WsSink) -> anyhow::Result<()>;

    /// The socket is about to be dropped for a hard reset: capture
    /// whatever must survive and clear per-connection state.
    fn on_hard_reset(&mut self);

    /// Connection-level state transitions.
    fn on_state_change(&mut self, state: SessionState);
}

/// Managed WebSocket connection.
pub struct WsConnection {
    url: String,
    config: ReconnectConfig,
}

impl WsConnection {
    /// Create a managed connection for `url`.
    pub fn new(url: String, config: ReconnectConfig) -> Self {
        Self { url, config }
    }

    /// Drive the session until `shutdown` flips, a fatal directive is
    /// returned, or `max_retries` is exhausted.
    ///
    /// Returns `Ok(())` on an orderly shutdown. Returns `Err` on a fatal
    /// directive (no auto-retry; the caller must call again deliberately)
    /// or when retries run out.
    pub async fn run<H: StreamHandler>(
        &self,
        handler: &mut H,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                handler.on_state_change(SessionState::Disconnected);
                return Ok(());
            }

            if attempt > 0 {
                handler.on_state_change(SessionState::Reconnecting);
                let backoff = calculate_backoff(
                    &self.config.initial_backoff,
                    &self.config.max_backoff,
                    attempt - 1,
                );
                tracing::info!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    url = %self.url,
                    "reconnecting"
                );

                if self.config.max_retries > 0 && attempt > self.config.max_retries {
                    let reason =
                        format!("exceeded max retries ({}) for {}", self.config.max_retries, self.url);
                    handler.on_state_change(SessionState::Disconnected);
                    anyhow::bail!(reason);
                }

                tokio::select! {
                    _ = shutdown.changed() => continue,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            handler.on_state_change(SessionState::Connecting);
            let ws_stream = tokio::select! {
                _ = shutdown.changed() => continue,
                connected = tokio_tungstenite::connect_async(self.url.as_str()) => {
                    match connected {
                        Ok((stream, _response)) => stream,
                        Err(e) => {
                            tracing::error!(url = %self.url, error = %e, "connection failed");
                            attempt = attempt.saturating_add(1);
                            continue;
                        }
                    }
                }
            };

            let (mut sink, mut stream) = ws_stream.split();

            if let Err(e) = handler.on_connect(&mut sink).await {
                tracing::error!(url = %self.url, error = %e, "on_connect failed");
                attempt = attempt.saturating_add(1);
                continue;
            }

            // Single-reader frame loop. Leaving it drops the socket.
            let mut hard_reset = false;
            let disconnect_reason = loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        handler.on_state_change(SessionState::Disconnected);
                        return Ok(());
                    }
                    frame = tokio::time::timeout(self.config.liveness_timeout, stream.next()) => {
                        match frame {
                            Err(_elapsed) => {
                                break format!(
                                    "no traffic for {:?}; assuming dead peer",
                                    self.config.liveness_timeout
                                );
                            }
                            Ok(None) => break "stream closed".to_string(),
                            Ok(Some(Err(e))) => break format!("read error: {e}"),
                            Ok(Some(Ok(msg))) => {
                                match handler.on_frame(msg, &mut sink).await {
                                    Ok(Directive::Continue) => {}
                                    Ok(Directive::SoftReset) => {
                                        if let Err(e) = handler.on_soft_reset(&mut sink).await {
                                            tracing::error!(error = %e, "soft reset failed");
                                            break format!("soft reset failed: {e}");
                                        }
                                    }
                                    Ok(Directive::HardReset) => {
                                        handler.on_hard_reset();
                                        hard_reset = true;
                                        break "hard reset requested by venue".to_string();
                                    }
                                    Ok(Directive::Fatal(reason)) => {
                                        tracing::error!(reason = %reason, "fatal session error");
                                        handler.on_state_change(SessionState::Disconnected);
                                        anyhow::bail!(reason);
                                    }
                                    Err(e) => {
                                        // Handler errors are non-fatal for
                                        // the connection; keep reading.
                                        tracing::error!(error = %e, "frame handler error");
                                    }
                                }
                            }
                        }
                    }
                }
            };

            tracing::warn!(url = %self.url, reason = %disconnect_reason, "connection lost");
            if hard_reset {
                // Deliberate re-handshake: skip the backoff.
                handler.on_state_change(SessionState::Reconnecting);
                attempt = 0;
            } else {
                handler.on_state_change(SessionState::Disconnected);
                attempt = 1;
            }
        }
    }
}

/// Exponential backoff with jitter: `initial * 2^attempt` capped at `max`,
/// plus a random 0–50% of the base.
pub(crate) fn calculate_backoff(initial: &Duration, max: &Duration, attempt: u32) -> Duration {
    let base = initial
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(*max);
    let jitter_frac = rand::random::<f64>() * 0.5;
    let jitter = Duration::from_secs_f64(base.as_secs_f64() * jitter_frac);
    base + jitter
}

//! # coral-stream
//!
//! The streaming half of the connectivity layer: a reconnecting WebSocket
//! session that authenticates, subscribes, decodes the venue's push
//! protocol into typed messages, and routes them to the channel registry,
//! the tick buffer, and the fill reconciler.
//!
//! Exactly one logical reader processes inbound frames in arrival order;
//! that ordering is what makes the reconnect/resubscribe protocol safe.

pub mod bitfinex;
pub mod channels;
pub mod decoder;
pub mod tick_buffer;
pub mod ws;

pub use bitfinex::{BitfinexStream, StreamSettings, WalletStore};
pub use channels::{Channel, ChannelKind, ChannelRegistry};
pub use decoder::{decode, DecodeError, StreamMessage, TickerFrame};
pub use tick_buffer::TickBuffer;
pub use ws::{Directive, ReconnectConfig, SessionState, StreamHandler, WsConnection};

//! Channel-subscription bookkeeping.
//!
//! The venue assigns a numeric channel id to every subscription ack and
//! prefixes data frames with it. Ids are ephemeral per connection: the
//! registry is rebuilt wholesale on every reconnect, and a resubscription
//! that lands on a new id supersedes the old entry for that symbol so a
//! stale id can never route ticker frames to the wrong symbol.

use dashmap::DashMap;

use coral_core::types::Symbol;

/// What a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Ticker snapshots.
    Ticker,
    /// Trade executions.
    Trade,
    /// Wallet snapshots.
    Wallet,
}

/// One registered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Venue-assigned channel id, valid for this connection only.
    pub id: u32,
    /// Payload kind.
    pub kind: ChannelKind,
    /// Symbol the channel is keyed to — the durable identity across
    /// reconnects.
    pub symbol: Symbol,
}

/// Concurrent channel-id to (kind, symbol) map.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<u32, Channel>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel from a subscription ack.
    ///
    /// Re-acking an id that is already registered is a no-op. A new id for
    /// a (kind, symbol) pair that is already mapped elsewhere supersedes
    /// the older entry.
    pub fn register(&self, id: u32, kind: ChannelKind, symbol: Symbol) {
        if self.channels.contains_key(&id) {
            return;
        }
        let stale: Vec<u32> = self
            .channels
            .iter()
            .filter(|e| e.value().kind == kind && e.value().symbol == symbol)
            .map(|e| *e.key())
            .collect();
        for old_id in stale {
            tracing::debug!(old_id, new_id = id, symbol = %symbol, "superseding channel id");
            self.channels.remove(&old_id);
        }
        self.channels.insert(id, Channel { id, kind, symbol });
    }

    /// Kind and symbol of a channel id, if registered.
    pub fn lookup(&self, id: u32) -> Option<(ChannelKind, Symbol)> {
        self.channels
            .get(&id)
            .map(|e| (e.value().kind, e.value().symbol.clone()))
    }

    /// Every symbol with a registered channel of the given kind, sorted.
    pub fn symbols_of(&self, kind: ChannelKind) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .channels
            .iter()
            .filter(|e| e.value().kind == kind)
            .map(|e| e.value().symbol.clone())
            .collect();
        symbols.sort_by(|a, b| a.0.cmp(&b.0));
        symbols.dedup();
        symbols
    }

    /// Drop every registered channel (hard-reset path).
    pub fn clear(&self) {
        self.channels.clear();
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// `true` when no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

//! Latest-tick holding area.
//!
//! Producers overwrite the newest snapshot per symbol; the consuming
//! strategy layer drains at its own pace. A slow consumer therefore sees
//! coalesced ticks, never a growing backlog — the buffer is bounded by the
//! subscribed symbol universe.

use std::collections::HashMap;

use parking_lot::Mutex;

use coral_core::types::{Symbol, Tick};

/// Bounded, thread-safe holder of the latest tick per symbol.
#[derive(Debug, Default)]
pub struct TickBuffer {
    latest: Mutex<HashMap<Symbol, Tick>>,
}

impl TickBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tick` as the latest snapshot for its symbol, replacing any
    /// undrained predecessor.
    pub fn push(&self, tick: Tick) {
        self.latest.lock().insert(tick.symbol.clone(), tick);
    }

    /// Latest undrained snapshot for a symbol, if any.
    pub fn get(&self, symbol: &Symbol) -> Option<Tick> {
        self.latest.lock().get(symbol).cloned()
    }

    /// Remove and return the latest snapshot of every symbol, sorted by
    /// symbol for deterministic consumption.
    pub fn drain(&self) -> Vec<Tick> {
        let mut ticks: Vec<Tick> = std::mem::take(&mut *self.latest.lock())
            .into_values()
            .collect();
        ticks.sort_by(|a, b| a.symbol.0.cmp(&b.symbol.0));
        ticks
    }

    /// Number of symbols with an undrained snapshot.
    pub fn len(&self) -> usize {
        self.latest.lock().len()
    }

    /// `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.latest.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coral_core::types::{Price, Quantity, Timestamp, Venue};

    fn tick(symbol: &str, last: i64) -> Tick {
        Tick {
            venue: Venue::Bitfinex,
            symbol: Symbol::new(symbol),
            bid: Price::new(last - 1, 4),
            ask: Price::new(last + 1, 4),
            bid_size: Quantity::new(10, 0),
            ask_size: Quantity::new(10, 0),
            last: Price::new(last, 4),
            volume: Quantity::new(1000, 0),
            high: Price::new(last + 100, 4),
            low: Price::new(last - 100, 4),
            timestamp: Timestamp::now(),
        }
    }

    #[test]
    fn test_push_and_drain() {
        let buf = TickBuffer::new();
        buf.push(tick("BTCUSD", 43272));
        buf.push(tick("ETHUSD", 3100));

        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].symbol, Symbol::new("BTCUSD"));
        assert_eq!(drained[1].symbol, Symbol::new("ETHUSD"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_slow_consumer_sees_coalesced_snapshot() {
        let buf = TickBuffer::new();
        buf.push(tick("BTCUSD", 43270));
        buf.push(tick("BTCUSD", 43271));
        buf.push(tick("BTCUSD", 43272));

        let drained = buf.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].last, Price::new(43272, 4));
    }

    #[test]
    fn test_get_does_not_consume() {
        let buf = TickBuffer::new();
        buf.push(tick("BTCUSD", 43272));

        assert!(buf.get(&Symbol::new("BTCUSD")).is_some());
        assert_eq!(buf.len(), 1);
        assert!(buf.get(&Symbol::new("ETHUSD")).is_none());
    }

    #[test]
    fn test_drain_when_empty() {
        let buf = TickBuffer::new();
        assert!(buf.drain().is_empty());
    }
}

//! Normalized order-status events and the queue they are delivered on.
//!
//! Events are the only way the rest of the system learns about order
//! progress — there is no callback wiring and nothing to poll on the
//! exchange side. Producers (the fill reconciler, the REST gateway) push;
//! the strategy layer drains at its own pace.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use coral_core::types::{OrderId, Price, Quantity, Symbol, Timestamp, Venue};

use crate::tracker::OrderStatus;

/// A normalized order-status event.
///
/// `fill_quantity` is in internal units and signed by direction (negative
/// = sell); it is zero for non-fill transitions such as `Submitted` or
/// `Canceled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    /// When the event was produced.
    pub timestamp: Timestamp,
    /// Local order identifier.
    pub local_id: OrderId,
    /// Venue that reported the transition.
    pub venue: Venue,
    /// Trading pair.
    pub symbol: Symbol,
    /// Status after this event.
    pub status: OrderStatus,
    /// Executed quantity for fill events, signed by direction.
    pub fill_quantity: Quantity,
    /// Execution price for fill events.
    pub fill_price: Price,
    /// Fee in quote-currency units.
    pub fee: Price,
    /// Human-readable context.
    pub message: String,
}

impl OrderEvent {
    /// An event for a non-fill transition (submitted, canceled, invalid).
    pub fn transition(
        local_id: OrderId,
        venue: Venue,
        symbol: Symbol,
        status: OrderStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Timestamp::now(),
            local_id,
            venue,
            symbol,
            status,
            fill_quantity: Quantity::zero(0),
            fill_price: Price::zero(0),
            fee: Price::zero(0),
            message: message.into(),
        }
    }
}

/// Drain-all queue of [`OrderEvent`]s shared by every producer.
#[derive(Debug, Default)]
pub struct OrderEventQueue {
    events: Mutex<Vec<OrderEvent>>,
}

impl OrderEventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&self, event: OrderEvent) {
        self.events.lock().push(event);
    }

    /// Remove and return every queued event, in emission order.
    pub fn drain(&self) -> Vec<OrderEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of undelivered events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(id: u64) -> OrderEvent {
        OrderEvent::transition(
            OrderId(id),
            Venue::Bitfinex,
            Symbol::new("BTCUSD"),
            OrderStatus::Submitted,
            "test",
        )
    }

    #[test]
    fn test_push_and_drain_preserves_order() {
        let q = OrderEventQueue::new();
        q.push(submitted(1));
        q.push(submitted(2));
        q.push(submitted(3));

        let drained = q.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].local_id, OrderId(1));
        assert_eq!(drained[2].local_id, OrderId(3));
        assert!(q.is_empty());
    }

    #[test]
    fn test_drain_empties_queue() {
        let q = OrderEventQueue::new();
        q.push(submitted(1));
        assert_eq!(q.len(), 1);
        assert_eq!(q.drain().len(), 1);
        assert_eq!(q.drain().len(), 0);
    }

    #[test]
    fn test_transition_event_has_zero_fill_fields() {
        let e = submitted(9);
        assert!(e.fill_quantity.is_zero());
        assert!(e.fill_price.is_zero());
        assert!(e.fee.is_zero());
        assert_eq!(e.status, OrderStatus::Submitted);
    }
}

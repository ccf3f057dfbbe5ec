//! Concurrent cache of locally submitted orders.
//!
//! [`OrderTracker`] is the single mutable structure shared between the
//! inbound message path (fill reconciliation) and the REST path (placement
//! and cancellation). Both sides mutate through per-entry locks, so a
//! cancel-replace and a trade execution racing on the same order cannot
//! lose an update.
//!
//! Broker-assigned ids are indexed separately for O(1) lookup from trade
//! reports. When an order reaches a terminal status its broker ids are
//! evicted from that index — already-emitted events may still reference
//! them, but nothing routes through them again.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use coral_core::types::{BrokerOrderId, OrderId, OrderRequest, Quantity};

/// Lifecycle states of a tracked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted by the venue, resting.
    Submitted,
    /// Some quantity executed, some still open.
    PartiallyFilled,
    /// Fully executed; terminal.
    Filled,
    /// Canceled; terminal.
    Canceled,
    /// Rejected at submission; never enters the tracker.
    Invalid,
}

impl OrderStatus {
    /// `true` when no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Invalid)
    }
}

/// A locally known order and everything the venue has told us about it.
#[derive(Debug, Clone)]
pub struct TrackedOrder {
    /// Local identifier, owned by the strategy layer.
    pub local_id: OrderId,
    /// Broker ids in acquisition order. Cancel-replace appends; the whole
    /// list must be addressed when canceling.
    pub broker_ids: Vec<BrokerOrderId>,
    /// The original request as submitted.
    pub request: OrderRequest,
    /// Current status.
    pub status: OrderStatus,
    /// Cumulative executed quantity, internal units, absolute value.
    pub filled: Quantity,
}

impl TrackedOrder {
    /// A freshly submitted order carrying its first broker id.
    pub fn new(local_id: OrderId, request: OrderRequest, broker_id: BrokerOrderId) -> Self {
        Self {
            local_id,
            broker_ids: vec![broker_id],
            request,
            status: OrderStatus::Submitted,
            filled: Quantity::zero(0),
        }
    }
}

/// Tracker errors.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// An order with this local id is already tracked.
    #[error("order already tracked: {0}")]
    Duplicate(OrderId),
    /// No tracked order with this local id.
    #[error("order not tracked: {0}")]
    NotFound(OrderId),
    /// The order's status does not admit tracking.
    #[error("order {0} cannot be tracked with status {1:?}")]
    Untrackable(OrderId, OrderStatus),
}

/// Concurrent order cache with a broker-id lookup index.
#[derive(Debug, Default)]
pub struct OrderTracker {
    orders: DashMap<OrderId, TrackedOrder>,
    by_broker: DashMap<BrokerOrderId, OrderId>,
}

impl OrderTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an order. Invalid or terminal orders are rejected —
    /// a failed submission never enters the cache.
    pub fn add(&self, order: TrackedOrder) -> Result<(), TrackerError> {
        if order.status.is_terminal() {
            return Err(TrackerError::Untrackable(order.local_id, order.status));
        }
        if self.orders.contains_key(&order.local_id) {
            return Err(TrackerError::Duplicate(order.local_id));
        }
        for broker_id in &order.broker_ids {
            self.by_broker.insert(broker_id.clone(), order.local_id);
        }
        self.orders.insert(order.local_id, order);
        Ok(())
    }

    /// Associate an additional broker id with an order (cancel-replace
    /// produces a fresh id for the same local order).
    pub fn add_broker_id(
        &self,
        local_id: OrderId,
        broker_id: BrokerOrderId,
    ) -> Result<(), TrackerError> {
        let mut entry = self
            .orders
            .get_mut(&local_id)
            .ok_or(TrackerError::NotFound(local_id))?;
        if !entry.broker_ids.contains(&broker_id) {
            entry.broker_ids.push(broker_id.clone());
        }
        drop(entry);
        self.by_broker.insert(broker_id, local_id);
        Ok(())
    }

    /// Local id currently associated with a broker id, if any.
    pub fn local_id_of(&self, broker_id: &BrokerOrderId) -> Option<OrderId> {
        self.by_broker.get(broker_id).map(|e| *e.value())
    }

    /// Snapshot of the order a broker id belongs to.
    pub fn find_by_broker_id(&self, broker_id: &BrokerOrderId) -> Option<TrackedOrder> {
        let local_id = self.local_id_of(broker_id)?;
        self.orders.get(&local_id).map(|e| e.value().clone())
    }

    /// Snapshot of an order by local id.
    pub fn get(&self, local_id: OrderId) -> Option<TrackedOrder> {
        self.orders.get(&local_id).map(|e| e.value().clone())
    }

    /// Mutate an order under its entry lock. Returns `None` if the order
    /// is not tracked (e.g. it was concurrently removed).
    pub fn with_order<R>(
        &self,
        local_id: OrderId,
        f: impl FnOnce(&mut TrackedOrder) -> R,
    ) -> Option<R> {
        self.orders.get_mut(&local_id).map(|mut e| f(e.value_mut()))
    }

    /// Stop tracking an order, evicting its broker ids from the lookup
    /// index. Returns the removed order.
    pub fn remove(&self, local_id: OrderId) -> Option<TrackedOrder> {
        let (_, order) = self.orders.remove(&local_id)?;
        for broker_id in &order.broker_ids {
            self.by_broker.remove(broker_id);
        }
        Some(order)
    }

    /// Snapshot of every tracked order.
    pub fn all(&self) -> Vec<TrackedOrder> {
        self.orders.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of tracked orders.
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

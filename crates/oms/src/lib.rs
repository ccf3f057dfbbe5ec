//! # coral-oms
//!
//! Order state shared between the streaming and REST paths: the concurrent
//! order tracker, the fill reconciler that turns exchange trade reports
//! into normalized order events, and the event queue those events are
//! delivered through.

pub mod events;
pub mod reconciler;
pub mod tracker;

pub use events::{OrderEvent, OrderEventQueue};
pub use reconciler::FillReconciler;
pub use tracker::{OrderStatus, OrderTracker, TrackedOrder, TrackerError};

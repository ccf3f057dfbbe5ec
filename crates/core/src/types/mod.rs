//! Core types for the Coral connectivity layer.
//!
//! Prices and quantities are fixed-point; timestamps are raw nanoseconds.
//! Wire-format push messages decode into the typed structures in
//! [`market`] at the boundary — downstream code never touches raw JSON.

pub mod market;
pub mod order;
pub mod price;
pub mod quantity;
pub mod timestamp;

pub use market::{Tick, TradeExecution, WalletBalance};
pub use order::{BrokerOrderId, OrderId, OrderRequest, OrderType, Side, Symbol, Venue};
pub use price::Price;
pub use quantity::Quantity;
pub use timestamp::Timestamp;

//! # coral-execution
//!
//! The synchronous request/response half of the connectivity layer:
//! signed REST calls for order placement, cancellation, cancel-replace,
//! and account queries, each passing through an endpoint-scoped rate
//! limiter. Shares the order tracker and event queue with the streaming
//! path so REST-reported placements and push-reported fills stay
//! consistent.

pub mod gateway;
pub mod rate_limiter;
pub mod rest;

pub use gateway::{AccountBalance, BitfinexGateway, Holding, OpenOrder, OrderGateway};
pub use rate_limiter::RateLimiter;
pub use rest::{BitfinexRestClient, Nonce, RestError};

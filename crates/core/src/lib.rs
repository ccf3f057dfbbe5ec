//! # coral-core
//!
//! Shared building blocks for the Coral exchange connectivity layer: the
//! fixed-point price/quantity types, the wire-to-internal scaling codec,
//! HMAC request signing, layered configuration, and logging setup.
//!
//! Everything that both the streaming path (`coral-stream`) and the REST
//! path (`coral-execution`) need lives here so the two paths never depend
//! on each other.

pub mod config;
pub mod logging;
pub mod scaling;
pub mod signing;
pub mod types;

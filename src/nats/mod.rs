//! NATS JetStream integration module
//!
//! Provides the durable consumer client and the delivery abstraction the
//! bridge runs on

pub mod client;
pub mod delivery;

pub use client::{LinkState, NatsClient};
pub use delivery::Delivery;

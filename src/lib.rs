//! # nats-stdout-bridge
//!
//! Reads a NATS JetStream subject through a durable consumer and writes every
//! payload to stdout as one line, acknowledging each message once its line is
//! flushed. Meant to feed shell pipelines and process-based ingestion tools.
//!
//! ```text
//! NATS_URL=nats://localhost:4222 SUBJECT=metrics.system.snapshot BATCH_SIZE=0 \
//!     nats-to-stdout --durable nifi-consumer
//! ```
//!
//! A batch size of `N > 0` stops after `N` acknowledged messages; `0` runs
//! until interrupted or disconnected.

pub mod bridge;
pub mod config;
pub mod error;

// NATS JetStream integration
pub mod nats;

pub use bridge::{Bridge, InvalidUtf8Policy, RunSummary, StopReason};
pub use config::{BatchLimit, BridgeConfig, Cli};
pub use error::BridgeError;
pub use nats::{Delivery, NatsClient};

//! A delivered message: payload bytes plus the handle used to acknowledge it
//!
//! The runner only sees this trait, so it can be driven by JetStream
//! messages in production and by in-memory deliveries in tests.

use std::future::Future;

use async_nats::jetstream;

use crate::error::BridgeError;

pub trait Delivery: Send {
    /// Raw payload bytes
    fn payload(&self) -> &[u8];

    /// Stream sequence, when the broker provides one
    fn sequence(&self) -> Option<u64> {
        None
    }

    /// Acknowledge the message, consuming it
    fn ack(self) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Hand the message back for redelivery, consuming it
    fn nak(self) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl Delivery for jetstream::Message {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn sequence(&self) -> Option<u64> {
        self.info().ok().map(|info| info.stream_sequence)
    }

    fn ack(self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        async move {
            // Inherent ack, not this trait method
            jetstream::Message::ack(&self)
                .await
                .map_err(|e| BridgeError::Ack(e.to_string()))
        }
    }

    fn nak(self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        async move {
            self.ack_with(jetstream::AckKind::Nak(None))
                .await
                .map_err(|e| BridgeError::Ack(e.to_string()))
        }
    }
}

//! Error type for the bridge.
//!
//! Every variant is fatal: the runner stops and the process exits nonzero.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Invalid or contradictory configuration
    Config(String),
    /// Could not reach the broker
    Connect(String),
    /// Stream lookup or durable consumer setup failed
    Subscribe(String),
    /// Payload is not valid UTF-8 under the strict policy
    Decode {
        sequence: Option<u64>,
        reason: String,
    },
    /// Writing or flushing stdout failed
    Output(String),
    /// Broker rejected or never received the acknowledgment
    Ack(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BridgeError::Connect(msg) => write!(f, "Connection error: {}", msg),
            BridgeError::Subscribe(msg) => write!(f, "Subscription error: {}", msg),
            BridgeError::Decode { sequence: Some(seq), reason } => {
                write!(f, "Decode error at stream sequence {}: {}", seq, reason)
            }
            BridgeError::Decode { sequence: None, reason } => {
                write!(f, "Decode error: {}", reason)
            }
            BridgeError::Output(msg) => write!(f, "Output error: {}", msg),
            BridgeError::Ack(msg) => write!(f, "Acknowledgment error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

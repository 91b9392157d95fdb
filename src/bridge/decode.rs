//! Payload decoding.

use std::borrow::Cow;

use clap::ValueEnum;

use crate::error::BridgeError;

/// Handling of payloads that are not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InvalidUtf8Policy {
    /// Stop the bridge without acknowledging the message
    #[default]
    Fail,
    /// Replace invalid sequences with U+FFFD and carry on
    Lossy,
}

/// Decode a payload into the text written to stdout.
///
/// `sequence` is the stream sequence of the message, used only for the error.
pub fn decode_payload(
    payload: &[u8],
    policy: InvalidUtf8Policy,
    sequence: Option<u64>,
) -> Result<Cow<'_, str>, BridgeError> {
    match policy {
        InvalidUtf8Policy::Fail => std::str::from_utf8(payload)
            .map(Cow::Borrowed)
            .map_err(|e| BridgeError::Decode {
                sequence,
                reason: e.to_string(),
            }),
        InvalidUtf8Policy::Lossy => Ok(String::from_utf8_lossy(payload)),
    }
}

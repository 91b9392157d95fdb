//! Line-oriented output.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::BridgeError;

/// Writes one newline-terminated line per message and flushes after each.
pub struct LineSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write `line` plus `\n`, then flush.
    ///
    /// The line is written as-is; a payload that already ends in a newline
    /// produces an empty line after it.
    pub async fn write_line(&mut self, line: &str) -> Result<(), BridgeError> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BridgeError::Output(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| BridgeError::Output(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| BridgeError::Output(e.to_string()))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

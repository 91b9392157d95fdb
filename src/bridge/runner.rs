//! Subscription pump and the counted forwarding loop.
//!
//! The pump owns the broker stream and pushes deliveries into a bounded
//! queue. The bridge drains the queue in order: decode, write, flush, ack,
//! count. It stops when the batch limit is reached, when the shutdown
//! future resolves, or when the pump goes away. Whatever is still queued
//! at that point goes back to the server with `release_pending`.

use std::fmt;
use std::future::Future;

use futures::{Stream, StreamExt};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::bridge::decode::{decode_payload, InvalidUtf8Policy};
use crate::bridge::sink::LineSink;
use crate::config::BatchLimit;
use crate::error::BridgeError;
use crate::nats::Delivery;

/// Why the bridge stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BatchComplete,
    Interrupted,
    Disconnected,
    SubscriptionEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BatchComplete => write!(f, "batch complete"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::Disconnected => write!(f, "disconnected"),
            StopReason::SubscriptionEnded => write!(f, "subscription ended"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages written and acknowledged
    pub forwarded: u64,
    pub reason: StopReason,
}

/// Forward deliveries from `messages` into `queue` until the stream ends or
/// the receiving side is dropped. Receive errors are logged and skipped.
///
/// Returns the number of deliveries handed to the queue.
pub async fn pump<S, D, E>(mut messages: S, queue: mpsc::Sender<D>) -> u64
where
    S: Stream<Item = Result<D, E>> + Unpin,
    E: fmt::Display,
{
    let mut queued = 0;

    while let Some(next) = messages.next().await {
        let delivery = match next {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!("Error receiving message: {}", e);
                continue;
            }
        };

        if queue.send(delivery).await.is_err() {
            tracing::debug!("Bridge stopped reading, closing subscription pump");
            break;
        }
        queued += 1;
    }

    queued
}

/// Pump at most `total` deliveries, one pull request at a time.
///
/// `request` is called with the number of deliveries still owed and must
/// yield a finite batch no larger than that. Stops early when a request
/// fails or the receiving side is dropped.
pub async fn pump_limited<R, Fut, S, D, E>(mut request: R, queue: mpsc::Sender<D>, total: u64) -> u64
where
    R: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<S, BridgeError>>,
    S: Stream<Item = Result<D, E>> + Unpin,
    E: fmt::Display,
{
    let mut queued = 0;

    while queued < total && !queue.is_closed() {
        let batch = match request(total - queued).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Pull request failed: {}", e);
                break;
            }
        };
        queued += pump(batch, queue.clone()).await;
    }

    queued
}

/// Close `queue` and hand every delivery still in it back to the server,
/// so the next run of the same consumer sees them first.
pub async fn release_pending<D: Delivery>(queue: &mut mpsc::Receiver<D>) -> u64 {
    queue.close();
    let mut released = 0;

    while let Ok(delivery) = queue.try_recv() {
        let sequence = delivery.sequence();
        match delivery.nak().await {
            Ok(()) => released += 1,
            Err(e) => tracing::warn!(?sequence, "Could not return message for redelivery: {}", e),
        }
    }

    if released > 0 {
        tracing::info!(released, "Returned unprinted messages for redelivery");
    }
    released
}

pub struct Bridge<W> {
    sink: LineSink<W>,
    limit: BatchLimit,
    policy: InvalidUtf8Policy,
}

impl<W: AsyncWrite + Unpin> Bridge<W> {
    pub fn new(writer: W, limit: BatchLimit, policy: InvalidUtf8Policy) -> Self {
        Self {
            sink: LineSink::new(writer),
            limit,
            policy,
        }
    }

    /// Drain `queue` until the batch limit, `shutdown`, or the end of the queue.
    /// The queue is left with the caller, holding anything not yet forwarded.
    ///
    /// A message is acknowledged only after its line has been flushed, so
    /// every printed line matches exactly one acknowledged message. Any
    /// error stops the loop and leaves the failing message unacknowledged,
    /// except an ack failure, whose line was already written.
    pub async fn run<D, F>(
        &mut self,
        queue: &mut mpsc::Receiver<D>,
        shutdown: F,
    ) -> Result<RunSummary, BridgeError>
    where
        D: Delivery,
        F: Future<Output = StopReason>,
    {
        tokio::pin!(shutdown);
        let mut forwarded: u64 = 0;

        loop {
            if self.limit.is_reached(forwarded) {
                return Ok(RunSummary {
                    forwarded,
                    reason: StopReason::BatchComplete,
                });
            }

            let delivery = tokio::select! {
                biased;

                reason = &mut shutdown => {
                    return Ok(RunSummary { forwarded, reason });
                }
                next = queue.recv() => match next {
                    Some(delivery) => delivery,
                    None => {
                        return Ok(RunSummary {
                            forwarded,
                            reason: StopReason::SubscriptionEnded,
                        });
                    }
                },
            };

            self.forward(delivery).await?;
            forwarded += 1;
            tracing::debug!(forwarded, "Message forwarded");
        }
    }

    async fn forward<D: Delivery>(&mut self, delivery: D) -> Result<(), BridgeError> {
        {
            let line = decode_payload(delivery.payload(), self.policy, delivery.sequence())?;
            self.sink.write_line(&line).await?;
        }
        delivery.ack().await
    }

    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

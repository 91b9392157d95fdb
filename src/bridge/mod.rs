//! NATS to stdout bridge
//!
//! Wires the durable consumer, the subscription pump and the forwarding
//! loop together on the current task.

pub mod decode;
pub mod runner;
pub mod sink;

pub use decode::{decode_payload, InvalidUtf8Policy};
pub use runner::{pump, pump_limited, release_pending, Bridge, RunSummary, StopReason};
pub use sink::LineSink;

use tokio::sync::mpsc;

use crate::config::{BatchLimit, BridgeConfig};
use crate::error::BridgeError;
use crate::nats::client::request_batch;
use crate::nats::NatsClient;

/// Run the bridge until the batch completes, the process is interrupted, or
/// the broker goes away. Lines go to stdout.
pub async fn run(config: BridgeConfig) -> Result<RunSummary, BridgeError> {
    let client = NatsClient::connect(&config).await?;
    let consumer = client.durable_consumer(&config).await?;

    let (queue_tx, mut queue_rx) = mpsc::channel(config.queue_capacity);
    let capacity = config.queue_capacity;
    let pump_handle = match config.limit {
        BatchLimit::Unbounded => {
            let messages = client.subscribe(&consumer, capacity).await?;
            tokio::spawn(pump(Box::pin(messages), queue_tx))
        }
        // A continuous stream would keep pulling past the batch, so counted
        // runs only ever request what is left of the budget.
        BatchLimit::Count(total) => tokio::spawn(pump_limited(
            move |remaining| {
                let consumer = consumer.clone();
                async move {
                    request_batch(&consumer, remaining, capacity)
                        .await
                        .map(Box::pin)
                }
            },
            queue_tx,
            total,
        )),
    };

    let shutdown = {
        let disconnected = client.disconnected();
        async move {
            tokio::select! {
                _ = interrupted() => {
                    tracing::info!("Received shutdown signal");
                    StopReason::Interrupted
                }
                _ = disconnected => StopReason::Disconnected,
            }
        }
    };

    let mut bridge = Bridge::new(tokio::io::stdout(), config.limit, config.on_invalid_utf8);
    let outcome = bridge.run(&mut queue_rx, shutdown).await;

    pump_handle.abort();
    release_pending(&mut queue_rx).await;
    // Acks already sent must reach the server whether or not the run failed.
    let closed = client.close().await;

    let summary = outcome?;
    closed?;

    tracing::info!(
        forwarded = summary.forwarded,
        reason = %summary.reason,
        "Bridge stopped"
    );

    Ok(summary)
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

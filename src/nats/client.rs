//! NATS JetStream client for durable consumption
//!
//! Provides connection management, link-state tracking and the durable
//! pull consumer the bridge reads from.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::PullConsumer};
use async_nats::Event;
use tokio::sync::watch;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Whether the client currently has a live connection to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    link: watch::Receiver<LinkState>,
}

impl NatsClient {
    /// Connect to NATS and initialize JetStream
    ///
    /// Fails if the first connection attempt fails; there is no retry.
    pub async fn connect(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let (link_tx, link_rx) = watch::channel(LinkState::Connected);
        let link_tx = Arc::new(link_tx);

        let client = async_nats::ConnectOptions::new()
            .event_callback(move |event| {
                let link_tx = Arc::clone(&link_tx);
                async move { record_event(&link_tx, event) }
            })
            .connect(config.nats_url.as_str())
            .await
            .map_err(|e| BridgeError::Connect(format!("{}: {}", config.nats_url, e)))?;

        tracing::info!("Connected to NATS at {}", config.nats_url);

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            link: link_rx,
        })
    }

    /// Bind the durable pull consumer for the configured subject, creating
    /// it on first use.
    pub async fn durable_consumer(&self, config: &BridgeConfig) -> Result<PullConsumer, BridgeError> {
        let stream = self.stream_for(config).await?;

        let consumer = stream
            .get_or_create_consumer(
                &config.durable,
                jetstream::consumer::pull::Config {
                    durable_name: Some(config.durable.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    filter_subject: config.subject.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                BridgeError::Subscribe(format!(
                    "durable consumer '{}' on '{}': {}",
                    config.durable, config.subject, e
                ))
            })?;

        tracing::info!(
            "Consuming '{}' with durable consumer '{}'",
            config.subject,
            config.durable
        );

        Ok(consumer)
    }

    /// Open a continuous message stream on `consumer`. Only for unbounded
    /// runs: the stream keeps issuing pull requests as it drains.
    pub async fn subscribe(
        &self,
        consumer: &PullConsumer,
        queue_capacity: usize,
    ) -> Result<jetstream::consumer::pull::Stream, BridgeError> {
        consumer
            .stream()
            .max_messages_per_batch(queue_capacity)
            .messages()
            .await
            .map_err(|e| BridgeError::Subscribe(e.to_string()))
    }

    /// Resolves once the connection to the server is lost.
    pub fn disconnected(&self) -> impl Future<Output = ()> + 'static {
        let mut link = self.link.clone();
        async move {
            // Sender dropped means the client is gone, which is a disconnect too.
            let _ = link
                .wait_for(|state| *state == LinkState::Disconnected)
                .await;
        }
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Flush outstanding acknowledgments and release the connection.
    pub async fn close(self) -> Result<(), BridgeError> {
        if self.is_connected() {
            self.client
                .flush()
                .await
                .map_err(flush_error)?;
        }
        drop(self.jetstream);
        drop(self.client);
        tracing::info!("NATS connection closed");
        Ok(())
    }

    async fn stream_for(&self, config: &BridgeConfig) -> Result<jetstream::stream::Stream, BridgeError> {
        match (&config.stream, config.create_stream) {
            (Some(name), true) => {
                let stream = self
                    .jetstream
                    .get_or_create_stream(jetstream::stream::Config {
                        name: name.clone(),
                        subjects: vec![config.subject.clone()],
                        storage: jetstream::stream::StorageType::File,
                        num_replicas: 1,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| BridgeError::Subscribe(format!("stream '{}': {}", name, e)))?;
                tracing::info!("JetStream stream '{}' ready", name);
                Ok(stream)
            }
            (Some(name), false) => self
                .jetstream
                .get_stream(name)
                .await
                .map_err(|e| BridgeError::Subscribe(format!("stream '{}': {}", name, e))),
            (None, _) => {
                let name = self
                    .jetstream
                    .stream_by_subject(config.subject.clone())
                    .await
                    .map_err(|e| {
                        BridgeError::Subscribe(format!(
                            "no stream found for subject '{}': {}",
                            config.subject, e
                        ))
                    })?;
                tracing::debug!("Subject '{}' is stored in stream '{}'", config.subject, name);
                self.jetstream
                    .get_stream(&name)
                    .await
                    .map_err(|e| BridgeError::Subscribe(format!("stream '{}': {}", name, e)))
            }
        }
    }
}

fn record_event(link: &watch::Sender<LinkState>, event: Event) {
    match event {
        Event::Connected => {
            tracing::info!("NATS connection established");
            link.send_replace(LinkState::Connected);
        }
        Event::Disconnected => {
            tracing::warn!("NATS connection lost");
            link.send_replace(LinkState::Disconnected);
        }
        other => tracing::debug!("NATS client event: {}", other),
    }
}

/// Issue one pull request for at most `remaining` messages.
///
/// The server never delivers more than was asked for, so a bounded run that
/// only requests what is left of its budget cannot receive messages it will
/// not acknowledge. The request waits up to `BATCH_EXPIRES` for messages.
pub async fn request_batch(
    consumer: &PullConsumer,
    remaining: u64,
    queue_capacity: usize,
) -> Result<jetstream::consumer::pull::Batch, BridgeError> {
    consumer
        .batch()
        .max_messages(request_size(remaining, queue_capacity))
        .expires(BATCH_EXPIRES)
        .messages()
        .await
        .map_err(|e| BridgeError::Subscribe(e.to_string()))
}

pub const BATCH_EXPIRES: Duration = Duration::from_secs(30);

fn request_size(remaining: u64, queue_capacity: usize) -> usize {
    let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
    queue_capacity.min(remaining).max(1)
}

fn flush_error(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Connect(format!("flush before close failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_size_never_exceeds_remaining_budget() {
        assert_eq!(request_size(1, 64), 1);
        assert_eq!(request_size(3, 64), 3);
        assert_eq!(request_size(500, 64), 64);
        assert_eq!(request_size(u64::MAX, 16), 16);
    }

    #[test]
    fn test_flush_failure_is_a_connection_error() {
        let err = flush_error("connection reset by peer");
        assert!(matches!(err, BridgeError::Connect(_)));
        assert_eq!(
            err.to_string(),
            "Connection error: flush before close failed: connection reset by peer"
        );
    }

    #[test]
    fn test_record_event_tracks_link_state() {
        let (tx, rx) = watch::channel(LinkState::Connected);

        record_event(&tx, Event::Disconnected);
        assert_eq!(*rx.borrow(), LinkState::Disconnected);

        record_event(&tx, Event::Connected);
        assert_eq!(*rx.borrow(), LinkState::Connected);

        record_event(&tx, Event::LameDuckMode);
        assert_eq!(*rx.borrow(), LinkState::Connected);
    }
}

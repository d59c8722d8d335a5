// Copyright (c) 2025 - Cowboy AI, Inc.

//! JetStream stream backing the hub event store
//!
//! Every aggregate event is stored under
//! `hubstore.{group}.{aggregate}.{eventType}` in a single stream. Writers
//! set `Nats-Msg-Id` to `{aggregate}:{version}` so that two writers racing
//! for the same version are told apart by the duplicate window.
//!
//! ```rust,no_run
//! use ocf_cloud_hub::jetstream::{create_event_stream, JetStreamConfig, StorageType};
//!
//! # async fn open() -> Result<(), Box<dyn std::error::Error>> {
//! let client = async_nats::connect("nats://localhost:4222").await?;
//! let jetstream = async_nats::jetstream::new(client);
//! let config = JetStreamConfig {
//!     storage: StorageType::Memory,
//!     ..JetStreamConfig::default()
//! };
//! create_event_stream(&jetstream, config).await?;
//! # Ok(())
//! # }
//! ```

use async_nats::jetstream::{self, consumer::DeliverPolicy, stream::Stream};
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

use crate::errors::{HubError, HubResult};
use crate::subjects::EVENT_STORE_ROOT;

/// Configuration of the aggregate event stream
#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    pub stream_name: String,

    /// Subjects this stream captures (defaults to "hubstore.>")
    pub subjects: Vec<String>,

    /// Maximum age of messages; zero keeps them forever
    pub max_age: Duration,

    /// Window within which duplicate message ids are rejected
    pub duplicate_window: Duration,

    pub storage: StorageType,

    pub replicas: usize,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            stream_name: "HUB_EVENTS".to_string(),
            subjects: vec![format!("{EVENT_STORE_ROOT}.>")],
            max_age: Duration::ZERO,
            duplicate_window: Duration::from_secs(120),
            storage: StorageType::File,
            replicas: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    File,
    /// Lost on server restart; meant for tests
    Memory,
}

/// Opens the event stream, creating it on first use.
pub async fn create_event_stream(
    jetstream: &jetstream::Context,
    config: JetStreamConfig,
) -> HubResult<Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.subjects,
        max_age: config.max_age,
        duplicate_window: config.duplicate_window,
        storage,
        num_replicas: config.replicas,
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    jetstream
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| HubError::Nats(e.to_string()))
}

/// Message read back from the event stream
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Stream sequence of the message
    pub sequence: u64,
    pub payload: Bytes,
}

/// Reads every message currently stored under `filter_subject`.
pub async fn fetch_all(stream: &Stream, filter_subject: String) -> HubResult<Vec<Bytes>> {
    let messages = fetch(stream, filter_subject, DeliverPolicy::All).await?;
    Ok(messages.into_iter().map(|m| m.payload).collect())
}

/// Reads the messages under `filter_subject` that `deliver_policy` selects.
///
/// Uses an ephemeral pull consumer; a fetch that times out means the
/// stream has been drained.
pub async fn fetch(
    stream: &Stream,
    filter_subject: String,
    deliver_policy: DeliverPolicy,
) -> HubResult<Vec<StoredMessage>> {
    const BATCH_SIZE: usize = 1000;

    let consumer = stream
        .create_consumer(jetstream::consumer::pull::Config {
            filter_subject: filter_subject.clone(),
            deliver_policy,
            ack_policy: jetstream::consumer::AckPolicy::None,
            ..Default::default()
        })
        .await
        .map_err(|e| HubError::Nats(e.to_string()))?;

    let mut stored = Vec::new();
    loop {
        let batch = consumer
            .fetch()
            .max_messages(BATCH_SIZE)
            .expires(Duration::from_millis(500))
            .messages()
            .await;

        let mut messages = match batch {
            Ok(messages) => messages,
            Err(e) => {
                let text = e.to_string().to_lowercase();
                if text.contains("timeout") || text.contains("timed out") || text.contains("no messages") {
                    break;
                }
                return Err(HubError::Nats(e.to_string()));
            }
        };

        let mut count = 0;
        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| HubError::Nats(e.to_string()))?;
            let sequence = message
                .info()
                .map_err(|e| HubError::Nats(format!("stored message without metadata: {e}")))?
                .stream_sequence;
            stored.push(StoredMessage {
                sequence,
                payload: message.payload.clone(),
            });
            count += 1;
        }
        if count < BATCH_SIZE {
            break;
        }
    }

    debug!(filter = %filter_subject, count = stored.len(), "fetched stored events");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JetStreamConfig::default();
        assert_eq!(config.stream_name, "HUB_EVENTS");
        assert_eq!(config.subjects, vec!["hubstore.>"]);
        assert_eq!(config.storage, StorageType::File);
        assert!(config.duplicate_window > Duration::ZERO);
    }
}

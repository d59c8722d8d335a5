// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream Event Store Implementation
//!
//! Persists envelopes on `hubstore.{group}.{aggregate}.{event_type}`. Each
//! message carries the id `{aggregate}:{version}`, so a concurrent writer
//! of an already stored version is rejected by stream deduplication in
//! addition to the version check made before writing.
//!
//! Reads never replay a whole aggregate stream. The version check only
//! looks at the last message of each event type subject, and
//! [`EventStore::load_from_snapshot`] starts its consumer at the stream
//! sequence of the latest snapshot.
//!
//! A batch is published one message at a time, so it is not atomic: a
//! failure part way leaves the leading events stored. A retry of the same
//! batch is then rejected as a concurrency conflict, and the caller reloads
//! the aggregate, which already contains them.

use async_nats::jetstream::{self, consumer::DeliverPolicy, context::Publish, stream::Stream};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{HubError, HubResult};
use crate::event_store::{from_last_snapshot, validate_batch, EventStore};
use crate::events::EventEnvelope;
use crate::jetstream::{create_event_stream, fetch, fetch_all, JetStreamConfig};
use crate::subjects::{
    store_aggregate_filter, store_group_filter, store_subject, EVENT_STORE_ROOT,
};

/// NATS JetStream-backed event store
///
/// # Example
///
/// ```rust,no_run
/// use ocf_cloud_hub::event_store::NatsEventStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = NatsEventStore::connect("nats://localhost:4222").await?;
///     // Use store...
///     Ok(())
/// }
/// ```
pub struct NatsEventStore {
    jetstream: jetstream::Context,
    stream: Stream,
}

impl NatsEventStore {
    /// Connect to NATS and create or get the event stream
    pub async fn connect(nats_url: &str) -> HubResult<Self> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| HubError::Nats(e.to_string()))?;
        Self::with_client(client, JetStreamConfig::default()).await
    }

    /// Event store on an existing connection
    pub async fn with_client(client: async_nats::Client, config: JetStreamConfig) -> HubResult<Self> {
        let jetstream = jetstream::new(client);
        let stream = create_event_stream(&jetstream, config).await?;
        Ok(Self { jetstream, stream })
    }

    /// Last stored event of each event type of an aggregate, with its
    /// stream sequence.
    async fn latest_per_type(
        &self,
        group_id: &str,
        aggregate_id: Uuid,
    ) -> HubResult<Vec<(u64, EventEnvelope)>> {
        let messages = fetch(
            &self.stream,
            store_aggregate_filter(group_id, aggregate_id),
            DeliverPolicy::LastPerSubject,
        )
        .await?;
        messages
            .into_iter()
            .map(|m| Ok((m.sequence, decode(&m.payload)?)))
            .collect()
    }

    /// Every stored event of every aggregate, oldest first.
    pub async fn load_everything(&self) -> HubResult<Vec<EventEnvelope>> {
        let payloads = fetch_all(&self.stream, format!("{EVENT_STORE_ROOT}.>")).await?;
        let mut events = decode_all(&payloads)?;
        events.sort_by_key(|e| (e.timestamp, e.version));
        Ok(events)
    }
}

fn decode(payload: &[u8]) -> HubResult<EventEnvelope> {
    serde_json::from_slice::<EventEnvelope>(payload)
        .map_err(|e| HubError::Internal(format!("cannot decode stored event: {e}")))
}

fn decode_all(payloads: &[bytes::Bytes]) -> HubResult<Vec<EventEnvelope>> {
    payloads.iter().map(|p| decode(p)).collect()
}

#[async_trait]
impl EventStore for NatsEventStore {
    async fn save(&self, events: &[EventEnvelope]) -> HubResult<()> {
        let Some(first) = validate_batch(events)? else {
            return Ok(());
        };

        let next = self
            .latest_per_type(&first.group_id, first.aggregate_id)
            .await?
            .iter()
            .map(|(_, e)| e.version + 1)
            .max()
            .unwrap_or(0);
        if first.version != next {
            return Err(HubError::ConcurrencyConflict {
                expected: first.version,
                actual: next,
            });
        }

        for event in events {
            let subject = store_subject(&event.group_id, event.aggregate_id, &event.event_type);
            let payload = serde_json::to_vec(event)?;
            let publish = Publish::build()
                .payload(payload.into())
                .message_id(format!("{}:{}", event.aggregate_id, event.version));

            let ack = self
                .jetstream
                .send_publish(subject, publish)
                .await
                .map_err(|e| HubError::Nats(e.to_string()))?
                .await
                .map_err(|e| HubError::Nats(e.to_string()))?;

            if ack.duplicate {
                return Err(HubError::ConcurrencyConflict {
                    expected: event.version,
                    actual: event.version + 1,
                });
            }
        }

        debug!(
            aggregate_id = %first.aggregate_id,
            from_version = first.version,
            count = events.len(),
            "appended events to JetStream"
        );
        Ok(())
    }

    async fn load_from_snapshot(
        &self,
        group_id: &str,
        aggregate_id: Uuid,
    ) -> HubResult<Vec<EventEnvelope>> {
        let snapshot = self
            .latest_per_type(group_id, aggregate_id)
            .await?
            .into_iter()
            .filter(|(_, e)| e.is_snapshot)
            .map(|(sequence, _)| sequence)
            .max();
        let deliver_policy = match snapshot {
            Some(start_sequence) => DeliverPolicy::ByStartSequence { start_sequence },
            None => DeliverPolicy::All,
        };

        let messages = fetch(
            &self.stream,
            store_aggregate_filter(group_id, aggregate_id),
            deliver_policy,
        )
        .await?;
        let mut events = messages
            .iter()
            .map(|m| decode(&m.payload))
            .collect::<HubResult<Vec<_>>>()?;
        events.sort_by_key(|e| e.version);
        Ok(from_last_snapshot(events))
    }

    async fn load_all(&self, group_id: &str) -> HubResult<Vec<EventEnvelope>> {
        let payloads = fetch_all(&self.stream, store_group_filter(group_id)).await?;
        let mut events = decode_all(&payloads)?;
        events.sort_by_key(|e| (e.timestamp, e.version));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Integration tests with real NATS
    // These require a running NATS server and are marked with #[ignore]

    fn envelope(aggregate_id: Uuid, version: u64) -> EventEnvelope {
        EventEnvelope {
            event_type: "resourcelinkspublished".into(),
            aggregate_id,
            group_id: "dev-it".into(),
            version,
            is_snapshot: false,
            timestamp: 1,
            owner: "owner".into(),
            data: json!({}),
        }
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_nats_event_store_integration() -> HubResult<()> {
        let store = NatsEventStore::connect("nats://localhost:4222").await?;
        let aggregate_id = Uuid::new_v4();

        store.save(&[envelope(aggregate_id, 0), envelope(aggregate_id, 1)]).await?;
        let events = store.load_from_snapshot("dev-it", aggregate_id).await?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].version, 1);

        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_concurrency_control() -> HubResult<()> {
        let store = NatsEventStore::connect("nats://localhost:4222").await?;
        let aggregate_id = Uuid::new_v4();

        store.save(&[envelope(aggregate_id, 0)]).await?;
        let result = store.save(&[envelope(aggregate_id, 0)]).await;
        assert!(matches!(result, Err(HubError::ConcurrencyConflict { .. })));

        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_load_starts_at_latest_snapshot() -> HubResult<()> {
        let store = NatsEventStore::connect("nats://localhost:4222").await?;
        let aggregate_id = Uuid::new_v4();
        let snapshot = |version| EventEnvelope {
            event_type: "resourcelinkssnapshottaken".into(),
            is_snapshot: true,
            ..envelope(aggregate_id, version)
        };

        store
            .save(&[envelope(aggregate_id, 0), snapshot(1), envelope(aggregate_id, 2)])
            .await?;
        store.save(&[snapshot(3), envelope(aggregate_id, 4)]).await?;

        let versions: Vec<u64> = store
            .load_from_snapshot("dev-it", aggregate_id)
            .await?
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![3, 4]);

        let stale = store.save(&[envelope(aggregate_id, 4)]).await;
        assert_eq!(
            stale,
            Err(HubError::ConcurrencyConflict {
                expected: 4,
                actual: 5
            })
        );
        store.save(&[envelope(aggregate_id, 5)]).await?;
        Ok(())
    }
}

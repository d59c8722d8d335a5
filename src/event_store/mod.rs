// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Store Abstraction
//!
//! Append-only persistence of [`EventEnvelope`]s, grouped by device
//! (`group_id`) and ordered by version within each aggregate.
//!
//! # Architecture
//!
//! ```text
//! Aggregate → [EventEnvelope] → EventStore::save → Persistent Storage
//!                                                        ↓
//!                       Aggregate ← load_from_snapshot ←─┘
//! ```
//!
//! # Event Store Requirements
//!
//! 1. **Append-Only**: Events are never updated or deleted
//! 2. **Ordered**: Versions of one aggregate are contiguous from 0
//! 3. **Optimistic**: A save whose first version is not the next version
//!    of the stream fails with `ConcurrencyConflict`
//! 4. **Snapshots**: Replay starts at the most recent snapshot

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::errors::{HubError, HubResult};
use crate::events::EventEnvelope;

pub mod nats;

pub use nats::NatsEventStore;

/// Persistence of aggregate event streams
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events of a single aggregate atomically.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the first event's version is not the next
    ///   version of the stream
    /// - `InvalidArgument` if the events span aggregates or versions are
    ///   not contiguous
    async fn save(&self, events: &[EventEnvelope]) -> HubResult<()>;

    /// The most recent snapshot of the aggregate followed by every later
    /// event; the whole stream when no snapshot exists.
    async fn load_from_snapshot(
        &self,
        group_id: &str,
        aggregate_id: Uuid,
    ) -> HubResult<Vec<EventEnvelope>>;

    /// Every event of the group, ordered by timestamp then version.
    async fn load_all(&self, group_id: &str) -> HubResult<Vec<EventEnvelope>>;
}

/// Checks that `events` form one contiguous run of a single aggregate.
pub(crate) fn validate_batch(events: &[EventEnvelope]) -> HubResult<Option<&EventEnvelope>> {
    let Some(first) = events.first() else {
        return Ok(None);
    };
    for (offset, event) in events.iter().enumerate() {
        if event.aggregate_id != first.aggregate_id || event.group_id != first.group_id {
            return Err(HubError::InvalidArgument(
                "cannot save events of different aggregates together".to_string(),
            ));
        }
        if event.version != first.version + offset as u64 {
            return Err(HubError::InvalidArgument(format!(
                "event versions must be contiguous, got {} at offset {}",
                event.version, offset
            )));
        }
    }
    Ok(Some(first))
}

/// Cuts a version-ordered stream at its last snapshot.
pub(crate) fn from_last_snapshot(mut events: Vec<EventEnvelope>) -> Vec<EventEnvelope> {
    if let Some(index) = events.iter().rposition(|e| e.is_snapshot) {
        events.drain(..index);
    }
    events
}

/// Process-local event store
///
/// Used by tests and single-node deployments without JetStream.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<(String, Uuid), Vec<EventEnvelope>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save(&self, events: &[EventEnvelope]) -> HubResult<()> {
        let Some(first) = validate_batch(events)? else {
            return Ok(());
        };
        let mut streams = self.streams.write();
        let stream = streams
            .entry((first.group_id.clone(), first.aggregate_id))
            .or_default();
        let next = stream.last().map(|e| e.version + 1).unwrap_or(0);
        if first.version != next {
            return Err(HubError::ConcurrencyConflict {
                expected: first.version,
                actual: next,
            });
        }
        stream.extend_from_slice(events);
        Ok(())
    }

    async fn load_from_snapshot(
        &self,
        group_id: &str,
        aggregate_id: Uuid,
    ) -> HubResult<Vec<EventEnvelope>> {
        let streams = self.streams.read();
        let events = streams
            .get(&(group_id.to_string(), aggregate_id))
            .cloned()
            .unwrap_or_default();
        Ok(from_last_snapshot(events))
    }

    async fn load_all(&self, group_id: &str) -> HubResult<Vec<EventEnvelope>> {
        let streams = self.streams.read();
        let mut events: Vec<EventEnvelope> = streams
            .iter()
            .filter(|((group, _), _)| group == group_id)
            .flat_map(|(_, stream)| stream.iter().cloned())
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.version));
        Ok(events)
    }
}

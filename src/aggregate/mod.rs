// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-Sourced Aggregates
//!
//! Each aggregate folds its event stream into state and answers commands by
//! producing new events. State is never shared: every command replays a
//! fresh instance from the latest snapshot plus the trailing events.
//!
//! # Event Sourcing Pattern
//!
//! ```text
//! EventStore ──load_from_snapshot──▶ fold(handle_event) ──▶ state
//!                                                            │
//! Command ─────────────────────────────▶ handle_command ◀────┘
//!                                              │
//!                                   [HubEvent] (+ snapshot)
//!                                              │
//! EventStore ◀──save (optimistic)──────────────┤
//! EventPublisher ◀──publish────────────────────┘
//! ```
//!
//! # Aggregates
//!
//! | Aggregate                      | Identity                     |
//! |--------------------------------|------------------------------|
//! | [`ResourceStateSnapshotTaken`] | device id + resource href    |
//! | [`ResourceLinksSnapshotTaken`] | device id + `/plgd/res`      |
//! | [`DeviceMetadataSnapshotTaken`]| device id + `/plgd/dev`      |
//! | [`ServiceMetadataSnapshotTaken`]| hub id                      |
//!
//! # Concurrency
//!
//! The event store rejects a save whose first event does not carry the
//! next version of the stream. [`Aggregate::handle_command`] then reloads
//! and retries, up to a bounded number of attempts.
//!
//! # Time as Parameter
//!
//! Aggregates never read the clock; [`CommandContext::now`] carries it.

pub mod commands;
pub mod device_metadata;
pub mod resource_links;
pub mod resource_state;
pub mod service_metadata;

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{HubError, HubResult};
use crate::event_store::EventStore;
use crate::events::{EventEnvelope, HubEvent};
use crate::nats::EventPublisher;

pub use commands::*;
pub use device_metadata::DeviceMetadataSnapshotTaken;
pub use resource_links::ResourceLinksSnapshotTaken;
pub use resource_state::ResourceStateSnapshotTaken;
pub use service_metadata::{heartbeat_valid_until, MetadataUpdate, ServiceMetadataSnapshotTaken};

/// Default number of events between two snapshots
pub const DEFAULT_SNAPSHOT_THRESHOLD: u64 = 16;
/// Default number of reload attempts after a concurrency conflict
pub const DEFAULT_RETRY_LIMIT: usize = 8;

/// State machine of one aggregate type
pub trait AggregateModel: Default + Send + Sync {
    type Command: Clone + Send + Sync;

    /// Folds one event into the state. Events of other aggregate types are
    /// ignored.
    fn handle_event(&mut self, event: &HubEvent) -> HubResult<()>;

    /// Validates `command` and returns the resulting events, already folded
    /// into `self`. The first event carries `new_version`, each following
    /// event the next version.
    fn handle_command(
        &mut self,
        ctx: &CommandContext,
        command: Self::Command,
        new_version: u64,
    ) -> HubResult<Vec<HubEvent>>;

    /// Snapshot of the current state at `version`, when one may be taken.
    fn take_snapshot(&self, version: u64) -> Option<HubEvent>;
}

/// Replayed state of an aggregate and the version of its last event
#[derive(Debug, Clone)]
pub struct Loaded<M> {
    pub model: M,
    pub version: Option<u64>,
    /// Events folded since the most recent snapshot
    pub events_since_snapshot: u64,
}

impl<M> Loaded<M> {
    pub fn next_version(&self) -> u64 {
        self.version.map(|v| v + 1).unwrap_or(0)
    }
}

/// Folds stored events into a fresh model.
///
/// Unknown event types are skipped. An envelope without an event type or
/// with an undecodable payload aborts the replay with `Internal`.
pub fn replay<M: AggregateModel>(envelopes: &[EventEnvelope]) -> HubResult<Loaded<M>> {
    let mut loaded = Loaded {
        model: M::default(),
        version: None,
        events_since_snapshot: 0,
    };
    for envelope in envelopes {
        loaded.version = Some(envelope.version);
        if envelope.is_snapshot {
            loaded.events_since_snapshot = 0;
        } else {
            loaded.events_since_snapshot += 1;
        }
        match envelope.decode()? {
            Some(event) => loaded.model.handle_event(&event)?,
            None => debug!(
                event_type = %envelope.event_type,
                aggregate_id = %envelope.aggregate_id,
                "skipping unknown event type"
            ),
        }
    }
    Ok(loaded)
}

/// Command driver for one aggregate instance
pub struct Aggregate<M: AggregateModel> {
    group_id: String,
    aggregate_id: Uuid,
    store: Arc<dyn EventStore>,
    publisher: Option<Arc<dyn EventPublisher>>,
    snapshot_threshold: u64,
    retry_limit: usize,
    _model: PhantomData<fn() -> M>,
}

impl<M: AggregateModel> Aggregate<M> {
    pub fn new(group_id: impl Into<String>, aggregate_id: Uuid, store: Arc<dyn EventStore>) -> Self {
        Self {
            group_id: group_id.into(),
            aggregate_id,
            store,
            publisher: None,
            snapshot_threshold: DEFAULT_SNAPSHOT_THRESHOLD,
            retry_limit: DEFAULT_RETRY_LIMIT,
            _model: PhantomData,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_snapshot_threshold(mut self, threshold: u64) -> Self {
        self.snapshot_threshold = threshold.max(1);
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    /// Current state of the aggregate.
    pub async fn load(&self) -> HubResult<Loaded<M>> {
        let envelopes = self
            .store
            .load_from_snapshot(&self.group_id, self.aggregate_id)
            .await?;
        replay(&envelopes)
    }

    /// Handles a command, persists and publishes the resulting events.
    ///
    /// A stale or duplicate device report yields an empty event list.
    pub async fn handle_command(
        &self,
        ctx: &CommandContext,
        command: M::Command,
    ) -> HubResult<Vec<HubEvent>> {
        let mut attempt = 0;
        loop {
            let mut loaded = self.load().await?;
            let new_version = loaded.next_version();
            let mut events = loaded.model.handle_command(ctx, command.clone(), new_version)?;
            if events.is_empty() {
                return Ok(events);
            }
            self.append_snapshot(&loaded, &mut events);

            let envelopes = events
                .iter()
                .map(EventEnvelope::encode)
                .collect::<HubResult<Vec<_>>>()?;
            match self.store.save(&envelopes).await {
                Ok(()) => {
                    debug!(
                        aggregate_id = %self.aggregate_id,
                        version = new_version,
                        count = events.len(),
                        "saved events"
                    );
                    self.publish(&events).await;
                    return Ok(events);
                }
                Err(HubError::ConcurrencyConflict { expected, actual }) if attempt < self.retry_limit => {
                    attempt += 1;
                    debug!(
                        aggregate_id = %self.aggregate_id,
                        expected,
                        actual,
                        attempt,
                        "concurrency conflict, reloading aggregate"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn append_snapshot(&self, loaded: &Loaded<M>, events: &mut Vec<HubEvent>) {
        if events.last().map(HubEvent::is_snapshot).unwrap_or(false) {
            return;
        }
        let since = loaded.events_since_snapshot + events.len() as u64;
        if since < self.snapshot_threshold {
            return;
        }
        let version = loaded.next_version() + events.len() as u64;
        if let Some(snapshot) = loaded.model.take_snapshot(version) {
            events.push(snapshot);
        }
    }

    async fn publish(&self, events: &[HubEvent]) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        for event in events.iter().filter(|e| !e.is_snapshot()) {
            if let Err(e) = publisher.publish(event).await {
                warn!(
                    aggregate_id = %self.aggregate_id,
                    event_type = event.event_type(),
                    error = %e,
                    "failed to publish event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Status, APPLICATION_JSON};
    use crate::event_store::InMemoryEventStore;
    use crate::events::ResourceId;
    use chrono::{DateTime, Utc};

    fn ctx() -> CommandContext {
        let now = DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        CommandContext::new("owner", "user", "hub", now)
    }

    fn notify(sequence: u64) -> ResourceStateCommand {
        ResourceStateCommand::NotifyResourceChanged(NotifyResourceChangedRequest {
            resource_id: ResourceId::new("dev-1", "/a"),
            content: Content::new(APPLICATION_JSON, format!("{{\"n\":{sequence}}}").into_bytes()),
            status: Status::Ok,
            correlation_id: String::new(),
            command_metadata: Some(CommandMetadata::new("conn", sequence)),
        })
    }

    fn aggregate(store: Arc<InMemoryEventStore>) -> Aggregate<ResourceStateSnapshotTaken> {
        let rid = ResourceId::new("dev-1", "/a");
        Aggregate::new("dev-1", rid.to_uuid(), store).with_snapshot_threshold(3)
    }

    #[tokio::test]
    async fn test_versions_and_snapshots() {
        let store = Arc::new(InMemoryEventStore::new());
        let agg = aggregate(store.clone());

        for sequence in 1..=3 {
            agg.handle_command(&ctx(), notify(sequence)).await.unwrap();
        }
        let all = store.load_all("dev-1").await.unwrap();
        let versions: Vec<_> = all.iter().map(|e| (e.version, e.is_snapshot)).collect();
        assert_eq!(versions, vec![(0, false), (1, false), (2, false), (3, true)]);

        let tail = store.load_from_snapshot("dev-1", agg.aggregate_id()).await.unwrap();
        assert_eq!(tail.len(), 1);

        let loaded = agg.load().await.unwrap();
        assert_eq!(loaded.next_version(), 4);
        assert_eq!(
            loaded.model.latest_resource_change.unwrap().event_metadata.sequence,
            3
        );
    }

    #[tokio::test]
    async fn test_stale_report_persists_nothing() {
        let store = Arc::new(InMemoryEventStore::new());
        let agg = aggregate(store.clone());

        agg.handle_command(&ctx(), notify(5)).await.unwrap();
        let events = agg.handle_command(&ctx(), notify(4)).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(store.load_all("dev-1").await.unwrap().len(), 1);
    }

    #[test]
    fn test_replay_skips_unknown_and_rejects_empty_type() {
        let mut envelope = EventEnvelope::encode(
            &ResourceStateSnapshotTaken::default().take_snapshot(0).unwrap(),
        )
        .unwrap();
        envelope.event_type = "fromthefuture".into();
        let loaded = replay::<ResourceStateSnapshotTaken>(&[envelope.clone()]).unwrap();
        assert_eq!(loaded.version, Some(0));

        envelope.event_type.clear();
        assert!(matches!(
            replay::<ResourceStateSnapshotTaken>(&[envelope]),
            Err(HubError::Internal(_))
        ));
    }

    /// Store whose stream always moves ahead of the writer.
    struct RacingStore {
        saves: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventStore for RacingStore {
        async fn save(&self, events: &[EventEnvelope]) -> HubResult<()> {
            self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(HubError::ConcurrencyConflict {
                expected: events[0].version,
                actual: events[0].version + 1,
            })
        }

        async fn load_from_snapshot(
            &self,
            _group_id: &str,
            _aggregate_id: Uuid,
        ) -> HubResult<Vec<EventEnvelope>> {
            Ok(Vec::new())
        }

        async fn load_all(&self, _group_id: &str) -> HubResult<Vec<EventEnvelope>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_conflicts_retry_then_surface() {
        let store = Arc::new(RacingStore {
            saves: Default::default(),
        });
        let agg: Aggregate<ResourceStateSnapshotTaken> =
            Aggregate::new("dev-1", ResourceId::new("dev-1", "/a").to_uuid(), store.clone())
                .with_retry_limit(2);

        let err = agg.handle_command(&ctx(), notify(1)).await.unwrap_err();
        assert!(matches!(err, HubError::ConcurrencyConflict { .. }));
        assert_eq!(store.saves.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}

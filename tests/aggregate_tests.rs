// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for aggregate command handling
//!
//! These tests verify the complete flow:
//! 1. Handle command → generate events
//! 2. Persist events → contiguous versions in the event store
//! 3. Publish events → snapshots stay off the bus
//! 4. Reload → state reconstructed from the latest snapshot

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use ocf_cloud_hub::aggregate::{
    CommandMetadata, ConfirmDeviceMetadataUpdateRequest, ConfirmResourceRequest,
    DeviceMetadataCommand, DeviceMetadataSnapshotTaken, DeviceMetadataUpdate,
    NotifyResourceChangedRequest, PublishResourceLinksRequest, ResourceLinksCommand,
    ResourceLinksSnapshotTaken, ResourceStateCommand, ResourceStateSnapshotTaken,
    ServiceHeartbeatRequest, ServiceMetadataCommand, ServiceMetadataSnapshotTaken,
    UnpublishResourceLinksRequest, UpdateDeviceMetadataRequest, UpdateResourceRequest,
};
use ocf_cloud_hub::content::{Content, Status, APPLICATION_JSON};
use ocf_cloud_hub::events::service_metadata::{service_metadata_aggregate_id, SERVICES_GROUP_ID};
use ocf_cloud_hub::events::{Connection, Resource, ResourceId, ShadowSynchronization};
use ocf_cloud_hub::{
    Aggregate, CommandContext, EventPublisher, EventStore, HubError, HubEvent, HubResult,
    InMemoryEventStore,
};

// Test fixtures
fn test_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn ctx() -> CommandContext {
    CommandContext::new("alice", "user-1", "hub-1", test_timestamp())
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<HubEvent>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &HubEvent) -> HubResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

impl RecordingPublisher {
    fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event_type()).collect()
    }
}

fn links_aggregate(
    store: Arc<InMemoryEventStore>,
    publisher: Arc<RecordingPublisher>,
) -> Aggregate<ResourceLinksSnapshotTaken> {
    Aggregate::new("dev-1", ResourceId::links("dev-1").to_uuid(), store).with_publisher(publisher)
}

fn publish(hrefs: &[&str], sequence: u64) -> ResourceLinksCommand {
    ResourceLinksCommand::Publish(PublishResourceLinksRequest {
        device_id: "dev-1".into(),
        resources: hrefs.iter().map(|h| Resource::new("dev-1", *h)).collect(),
        correlation_id: String::new(),
        command_metadata: Some(CommandMetadata::new("conn", sequence)),
    })
}

fn unpublish(hrefs: &[&str], sequence: u64) -> ResourceLinksCommand {
    ResourceLinksCommand::Unpublish(UnpublishResourceLinksRequest {
        device_id: "dev-1".into(),
        hrefs: hrefs.iter().map(|h| h.to_string()).collect(),
        correlation_id: String::new(),
        command_metadata: Some(CommandMetadata::new("conn", sequence)),
    })
}

/// Test: links published, republished and unpublished through the store
#[tokio::test]
async fn test_resource_links_lifecycle() {
    let store = Arc::new(InMemoryEventStore::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let aggregate = links_aggregate(store.clone(), publisher.clone());

    let events = aggregate
        .handle_command(&ctx(), publish(&["/a", "/b"], 1))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    // Republishing upserts by href; the event still carries the full set
    let events = aggregate
        .handle_command(&ctx(), publish(&["/a"], 2))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(aggregate.load().await.unwrap().model.resources.len(), 2);

    // Unpublishing an unknown href changes nothing
    let events = aggregate
        .handle_command(&ctx(), unpublish(&["/zzz"], 3))
        .await
        .unwrap();
    assert!(events.is_empty());

    let events = aggregate
        .handle_command(&ctx(), unpublish(&["/a"], 4))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let stored = store.load_all("dev-1").await.unwrap();
    let versions: Vec<u64> = stored.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![0, 1, 2]);

    assert_eq!(
        publisher.event_types(),
        vec![
            "resourcelinkspublished",
            "resourcelinkspublished",
            "resourcelinksunpublished"
        ]
    );

    let loaded = aggregate.load().await.unwrap();
    let hrefs: Vec<&String> = loaded.model.resources.keys().collect();
    assert_eq!(hrefs, vec!["/b"]);
    assert_eq!(loaded.next_version(), 3);
}

/// Test: snapshots are stored but never published
#[tokio::test]
async fn test_snapshots_are_not_published() {
    let store = Arc::new(InMemoryEventStore::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let aggregate = links_aggregate(store.clone(), publisher.clone()).with_snapshot_threshold(2);

    aggregate
        .handle_command(&ctx(), publish(&["/a"], 1))
        .await
        .unwrap();
    let events = aggregate
        .handle_command(&ctx(), publish(&["/b"], 2))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[1].is_snapshot());

    let stored = store.load_all("dev-1").await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored[2].is_snapshot);
    assert_eq!(publisher.event_types().len(), 2);

    let tail = store
        .load_from_snapshot("dev-1", aggregate.aggregate_id())
        .await
        .unwrap();
    assert_eq!(tail.len(), 1);

    let loaded = aggregate.load().await.unwrap();
    assert_eq!(loaded.model.resources.len(), 2);
    assert_eq!(loaded.next_version(), 3);
}

fn resource_aggregate(store: Arc<InMemoryEventStore>) -> Aggregate<ResourceStateSnapshotTaken> {
    Aggregate::new("dev-1", ResourceId::new("dev-1", "/light").to_uuid(), store)
        .with_snapshot_threshold(2)
}

fn notify(sequence: u64) -> ResourceStateCommand {
    ResourceStateCommand::NotifyResourceChanged(NotifyResourceChangedRequest {
        resource_id: ResourceId::new("dev-1", "/light"),
        content: Content::new(APPLICATION_JSON, format!("{{\"n\":{sequence}}}").into_bytes()),
        status: Status::Ok,
        correlation_id: String::new(),
        command_metadata: Some(CommandMetadata::new("dev-conn", sequence)),
    })
}

/// Test: a pending update holds back snapshots until it is confirmed
#[tokio::test]
async fn test_update_pending_then_confirmed() {
    let store = Arc::new(InMemoryEventStore::new());
    let aggregate = resource_aggregate(store.clone());

    aggregate.handle_command(&ctx(), notify(1)).await.unwrap();
    let pending = aggregate
        .handle_command(
            &ctx(),
            ResourceStateCommand::UpdateResource(UpdateResourceRequest {
                resource_id: ResourceId::new("dev-1", "/light"),
                resource_interface: String::new(),
                content: Content::new(APPLICATION_JSON, b"{\"n\":7}".to_vec()),
                correlation_id: "update-1".into(),
                time_to_live: Duration::seconds(10),
                command_metadata: Some(CommandMetadata::new("client", 0)),
            }),
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1, "no snapshot while an update is pending");
    assert!(aggregate.load().await.unwrap().model.is_pending());

    let confirmed = aggregate
        .handle_command(
            &ctx(),
            ResourceStateCommand::ConfirmResourceUpdate(ConfirmResourceRequest {
                resource_id: ResourceId::new("dev-1", "/light"),
                correlation_id: "update-1".into(),
                content: Content::default(),
                status: Status::Ok,
                command_metadata: Some(CommandMetadata::new("dev-conn", 2)),
            }),
        )
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 2);
    assert_eq!(confirmed[0].event_type(), "resourceupdated");
    assert!(confirmed[1].is_snapshot());

    let loaded = aggregate.load().await.unwrap();
    assert_eq!(loaded.model.pending_requests_count, 0);
    assert_eq!(loaded.version, Some(3));
}

/// Test: stale reports from the same connection persist nothing
#[tokio::test]
async fn test_stale_reports_are_dropped() {
    let store = Arc::new(InMemoryEventStore::new());
    let aggregate = resource_aggregate(store.clone());

    aggregate.handle_command(&ctx(), notify(5)).await.unwrap();
    assert!(aggregate.handle_command(&ctx(), notify(5)).await.unwrap().is_empty());
    assert!(aggregate.handle_command(&ctx(), notify(3)).await.unwrap().is_empty());
    assert_eq!(store.load_all("dev-1").await.unwrap().len(), 1);
}

/// Test: shadow synchronization is applied only after confirmation
#[tokio::test]
async fn test_device_metadata_shadow_synchronization() {
    let store = Arc::new(InMemoryEventStore::new());
    let aggregate: Aggregate<DeviceMetadataSnapshotTaken> = Aggregate::new(
        "dev-1",
        ResourceId::device_metadata("dev-1").to_uuid(),
        store.clone(),
    );
    let update = |update: DeviceMetadataUpdate, correlation_id: &str, sequence: u64| {
        DeviceMetadataCommand::Update(UpdateDeviceMetadataRequest {
            device_id: "dev-1".into(),
            update,
            correlation_id: correlation_id.into(),
            time_to_live: Duration::zero(),
            command_metadata: Some(CommandMetadata::new("conn", sequence)),
        })
    };

    aggregate
        .handle_command(
            &ctx(),
            update(DeviceMetadataUpdate::Connection(Connection::online()), "", 1),
        )
        .await
        .unwrap();
    aggregate
        .handle_command(
            &ctx(),
            update(
                DeviceMetadataUpdate::ShadowSynchronization(ShadowSynchronization::Disabled),
                "sync-1",
                2,
            ),
        )
        .await
        .unwrap();

    let loaded = aggregate.load().await.unwrap();
    assert!(loaded.model.connection().is_online());
    assert_eq!(loaded.model.update_pendings.len(), 1);
    assert_eq!(
        loaded.model.shadow_synchronization(),
        ShadowSynchronization::Unset
    );

    aggregate
        .handle_command(
            &ctx(),
            DeviceMetadataCommand::Confirm(ConfirmDeviceMetadataUpdateRequest {
                device_id: "dev-1".into(),
                correlation_id: "sync-1".into(),
                status: Status::Ok,
                command_metadata: Some(CommandMetadata::new("conn", 3)),
            }),
        )
        .await
        .unwrap();

    let loaded = aggregate.load().await.unwrap();
    assert!(loaded.model.update_pendings.is_empty());
    assert_eq!(
        loaded.model.shadow_synchronization(),
        ShadowSynchronization::Disabled
    );
}

/// Test: a time-to-live past the representable calendar is rejected, not applied
#[tokio::test]
async fn test_out_of_range_time_to_live_is_rejected() {
    let huge = Duration::days(365 * 1_000_000);
    assert!(matches!(ctx().valid_until(huge), Err(HubError::InvalidArgument(_))));

    let store = Arc::new(InMemoryEventStore::new());
    let aggregate = resource_aggregate(store.clone());
    aggregate.handle_command(&ctx(), notify(1)).await.unwrap();

    let result = aggregate
        .handle_command(
            &ctx(),
            ResourceStateCommand::UpdateResource(UpdateResourceRequest {
                resource_id: ResourceId::new("dev-1", "/light"),
                resource_interface: String::new(),
                content: Content::new(APPLICATION_JSON, b"{\"n\":7}".to_vec()),
                correlation_id: "update-1".into(),
                time_to_live: huge,
                command_metadata: Some(CommandMetadata::new("client", 0)),
            }),
        )
        .await;
    assert!(matches!(result, Err(HubError::InvalidArgument(_))));
    assert_eq!(store.load_all("dev-1").await.unwrap().len(), 1);

    let services: Aggregate<ServiceMetadataSnapshotTaken> = Aggregate::new(
        SERVICES_GROUP_ID,
        service_metadata_aggregate_id("hub-1"),
        store.clone(),
    );
    let result = services
        .handle_command(
            &ctx(),
            ServiceMetadataCommand::Heartbeat(ServiceHeartbeatRequest {
                service_id: "gateway-1".into(),
                time_to_live: huge,
                timestamp: test_timestamp(),
            }),
        )
        .await;
    assert!(matches!(result, Err(HubError::InvalidArgument(_))));
    assert!(store.load_all(SERVICES_GROUP_ID).await.unwrap().is_empty());
}


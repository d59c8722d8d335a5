// Copyright (c) 2025 - Cowboy AI, Inc.

//! Device Directory Projection
//!
//! Read model of devices, resource links and latest resource content, fed by
//! hub events and registration announcements.
//!
//! # Architecture
//!
//! ```text
//! event store ──replay──┐
//!                       ├──▶ DirectoryProjection ──▶ DeviceDirectory queries
//! event bus ───follow───┘
//! ```
//!
//! Applying the same event twice leaves the same state: links are keyed by
//! href, content and connection are overwritten by later versions.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cloud2cloud::directory::{DeviceDirectory, DeviceRecord};
use crate::cloud2cloud::source::{decode_message, RegistrationEvent, SourceEvent};
use crate::errors::HubResult;
use crate::events::{
    Connection, DeviceMetadataUpdated, EventEnvelope, HubEvent, Resource, ResourceChanged,
    ResourceId,
};
use crate::nats::NatsClient;
use crate::subjects::HUB_ROOT;

/// Applies an ordered event stream to a read model
#[async_trait]
pub trait ProjectionAdapter: Send + Sync {
    /// The event type this projection handles
    type Event: Send + Sync;

    /// Applies one event. Re-applying an event must be harmless.
    async fn project(&self, event: Self::Event) -> HubResult<()>;

    /// Clears all projected state.
    async fn reset(&self) -> HubResult<()>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Default)]
struct DeviceEntry {
    connection: Connection,
    connection_version: Option<u64>,
    links: BTreeMap<String, Resource>,
    contents: HashMap<String, ResourceChanged>,
}

/// In-memory directory of every owner's devices
#[derive(Debug, Default)]
pub struct DirectoryProjection {
    owners: RwLock<HashMap<String, BTreeMap<String, DeviceEntry>>>,
}

impl DirectoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a hub event. Events without an owner are ignored.
    pub fn apply(&self, event: &HubEvent) {
        self.apply_for(event.owner(), event);
    }

    /// Applies an event whose owner is known from its envelope.
    pub fn apply_for(&self, owner: &str, event: &HubEvent) {
        if owner.is_empty() {
            return;
        }
        let mut owners = self.owners.write();
        let devices = owners.entry(owner.to_string()).or_default();
        match event {
            HubEvent::ResourceLinksPublished(e) => {
                let entry = devices.entry(e.device_id.clone()).or_default();
                for resource in &e.resources {
                    entry.links.insert(resource.href.clone(), resource.clone());
                }
            }
            HubEvent::ResourceLinksUnpublished(e) => {
                let entry = devices.entry(e.device_id.clone()).or_default();
                if e.hrefs.is_empty() {
                    entry.links.clear();
                } else {
                    for href in &e.hrefs {
                        entry.links.remove(href);
                    }
                }
            }
            HubEvent::ResourceLinksSnapshotTaken(s) => {
                let entry = devices.entry(s.device_id.clone()).or_default();
                entry.links = s.resources.clone();
            }
            HubEvent::ResourceChanged(e) => {
                let entry = devices.entry(e.resource_id.device_id.clone()).or_default();
                let newer = entry
                    .contents
                    .get(&e.resource_id.href)
                    .map_or(true, |known| known.event_metadata.version <= e.event_metadata.version);
                if newer {
                    entry.contents.insert(e.resource_id.href.clone(), e.clone());
                }
            }
            HubEvent::ResourceStateSnapshotTaken(s) => {
                if let Some(change) = &s.latest_resource_change {
                    let entry = devices.entry(s.resource_id.device_id.clone()).or_default();
                    entry
                        .contents
                        .insert(s.resource_id.href.clone(), change.clone());
                }
            }
            HubEvent::DeviceMetadataUpdated(e) => {
                apply_connection(devices, e);
            }
            HubEvent::DeviceMetadataSnapshotTaken(s) => {
                if let Some(updated) = &s.device_metadata_updated {
                    apply_connection(devices, updated);
                }
            }
            _ => {}
        }
    }

    pub fn apply_registration(&self, event: &RegistrationEvent) {
        let mut owners = self.owners.write();
        let devices = owners.entry(event.owner().to_string()).or_default();
        match event {
            RegistrationEvent::DevicesRegistered { device_ids, .. } => {
                for id in device_ids {
                    devices.entry(id.clone()).or_default();
                }
            }
            RegistrationEvent::DevicesUnregistered { device_ids, .. } => {
                for id in device_ids {
                    devices.remove(id);
                }
            }
        }
    }

    /// Rebuilds state from stored envelopes, skipping unknown event types.
    pub fn hydrate(&self, envelopes: &[EventEnvelope]) -> HubResult<usize> {
        let mut applied = 0;
        for envelope in envelopes {
            if let Some(event) = envelope.decode()? {
                let owner = if envelope.owner.is_empty() {
                    event.owner()
                } else {
                    envelope.owner.as_str()
                };
                self.apply_for(owner, &event);
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Follows the event bus until `token` is canceled.
    pub async fn follow(&self, client: &NatsClient, token: CancellationToken) -> HubResult<()> {
        let subscribers = vec![
            client.subscribe(&format!("{HUB_ROOT}.owners.*.devices.>")).await?,
            client.subscribe(&format!("{HUB_ROOT}.owners.*.registrations")).await?,
        ];
        let mut messages = stream::select_all(subscribers);
        info!("directory projection following the event bus");
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => break,
                message = messages.next() => message,
            };
            let Some(message) = message else {
                warn!("event bus closed");
                break;
            };
            if message.subject.as_str().ends_with(".registrations") {
                match decode_message(message.subject.as_str(), &message.payload) {
                    Ok(Some(SourceEvent::Registration(event))) => self.apply_registration(&event),
                    Ok(_) => {}
                    Err(e) => debug!(subject = %message.subject, error = %e, "skipping message"),
                }
                continue;
            }
            let envelope = match serde_json::from_slice::<EventEnvelope>(&message.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!(subject = %message.subject, error = %e, "skipping message");
                    continue;
                }
            };
            if let Err(e) = self.project(envelope).await {
                debug!(subject = %message.subject, error = %e, "skipping message");
            }
        }
        Ok(())
    }

    fn with_device<T>(
        &self,
        owner: &str,
        device_id: &str,
        f: impl FnOnce(&DeviceEntry) -> T,
    ) -> Option<T> {
        self.owners
            .read()
            .get(owner)
            .and_then(|devices| devices.get(device_id))
            .map(f)
    }
}

fn apply_connection(devices: &mut BTreeMap<String, DeviceEntry>, updated: &DeviceMetadataUpdated) {
    if updated.canceled {
        return;
    }
    let entry = devices.entry(updated.device_id.clone()).or_default();
    let version = updated.event_metadata.version;
    if entry.connection_version.map_or(true, |known| known <= version) {
        entry.connection = updated.connection.clone();
        entry.connection_version = Some(version);
    }
}

#[async_trait]
impl ProjectionAdapter for DirectoryProjection {
    type Event = EventEnvelope;

    async fn project(&self, envelope: EventEnvelope) -> HubResult<()> {
        self.hydrate(std::slice::from_ref(&envelope)).map(|_| ())
    }

    async fn reset(&self) -> HubResult<()> {
        self.owners.write().clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "device-directory"
    }
}

#[async_trait]
impl DeviceDirectory for DirectoryProjection {
    async fn get_devices(&self, owner: &str, _access_token: &str) -> HubResult<Vec<DeviceRecord>> {
        Ok(self
            .owners
            .read()
            .get(owner)
            .map(|devices| {
                devices
                    .iter()
                    .map(|(id, entry)| DeviceRecord {
                        device_id: id.clone(),
                        connection: entry.connection.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_resource_links(
        &self,
        owner: &str,
        _access_token: &str,
        device_id: &str,
    ) -> HubResult<Vec<Resource>> {
        Ok(self
            .with_device(owner, device_id, |entry| {
                entry.links.values().cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn retrieve_resource(
        &self,
        owner: &str,
        _access_token: &str,
        resource_id: &ResourceId,
    ) -> HubResult<Option<ResourceChanged>> {
        Ok(self
            .with_device(owner, &resource_id.device_id, |entry| {
                entry.contents.get(&resource_id.href).cloned()
            })
            .flatten())
    }
}

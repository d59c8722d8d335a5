// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription event dispatcher
//!
//! One [`SubscriptionHandler`] serves every subscription type. It keeps the
//! requested event type set and translates [`SourceEvent`]s into webhook
//! notifications:
//!
//! | source event               | notification                          |
//! |----------------------------|---------------------------------------|
//! | ResourceChanged            | resource_contentchanged               |
//! | ResourceLinksPublished     | resources_published (new or changed)  |
//! | ResourceLinksUnpublished   | resources_unpublished (known links)   |
//! | DeviceMetadataUpdated      | devices_online / devices_offline      |
//! | DevicesRegistered          | devices_registered                    |
//! | DevicesUnregistered        | devices_unregistered                  |

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::directory::{DeviceDirectory, DeviceRecord};
use super::emit::EventEmitter;
use super::manager::SubscriptionData;
use super::source::{RegistrationEvent, SourceEvent, SourceHandler};
use super::store::SubscriptionStore;
use super::subscription::{EventType, SubscriptionType};
use crate::errors::{HubError, HubResult};
use crate::events::{ConnectionStatus, Resource};

/// Removes a subscription after a fatal delivery or stream failure
#[derive(Clone)]
pub struct Teardown(Arc<dyn Fn(&str, HubError) + Send + Sync>);

impl Teardown {
    pub fn new(teardown: impl Fn(&str, HubError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(teardown))
    }

    pub fn invoke(&self, subscription_id: &str, reason: HubError) {
        (self.0)(subscription_id, reason)
    }
}

/// A notification waiting for delivery
pub type Notification = (EventType, Value);

fn device_list<'a>(device_ids: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(device_ids.into_iter().map(|id| json!({ "di": id })).collect())
}

/// Dispatcher of one live subscription
pub struct SubscriptionHandler {
    data: Arc<SubscriptionData>,
    connection: u64,
    event_types: BTreeSet<EventType>,
    store: Arc<dyn SubscriptionStore>,
    emitter: EventEmitter,
    teardown: Teardown,
    known_links: Mutex<BTreeMap<String, Resource>>,
    known_devices: Mutex<HashMap<String, ConnectionStatus>>,
}

impl SubscriptionHandler {
    pub fn new(
        data: Arc<SubscriptionData>,
        connection: u64,
        store: Arc<dyn SubscriptionStore>,
        emitter: EventEmitter,
        teardown: Teardown,
    ) -> Self {
        let event_types = data.subscription().event_types.into_iter().collect();
        Self {
            data,
            connection,
            event_types,
            store,
            emitter,
            teardown,
            known_links: Mutex::new(BTreeMap::new()),
            known_devices: Mutex::new(HashMap::new()),
        }
    }

    fn wants(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type)
    }

    /// Loads the current state of the scope and returns the notifications
    /// describing it.
    ///
    /// Always seeds the known links and devices, so events replayed after a
    /// reconnect are not reported twice.
    pub async fn initial_state(
        &self,
        directory: &dyn DeviceDirectory,
    ) -> HubResult<Vec<Notification>> {
        let sub = self.data.subscription();
        let mut notifications = Vec::new();
        match sub.subscription_type {
            SubscriptionType::Devices => {
                let devices = directory.get_devices(&sub.owner, &sub.access_token).await?;
                self.seed_devices(&devices);

                let ids = |online: Option<bool>| -> Vec<String> {
                    devices
                        .iter()
                        .filter(|d| online.map_or(true, |o| d.is_online() == o))
                        .map(|d| d.device_id.clone())
                        .collect()
                };
                for (event_type, filter) in [
                    (EventType::DevicesRegistered, None),
                    (EventType::DevicesOnline, Some(true)),
                    (EventType::DevicesOffline, Some(false)),
                ] {
                    let selected = ids(filter);
                    if self.wants(event_type) && !selected.is_empty() {
                        notifications.push((event_type, device_list(&selected)));
                    }
                }
            }
            SubscriptionType::Device => {
                let links = directory
                    .get_resource_links(&sub.owner, &sub.access_token, &sub.device_id)
                    .await?;
                self.seed_links(&links);
                if self.wants(EventType::ResourcesPublished) && !links.is_empty() {
                    notifications.push((EventType::ResourcesPublished, serde_json::to_value(&links)?));
                }
            }
            SubscriptionType::Resource => {
                let Some(resource_id) = sub.resource_id() else {
                    return Ok(notifications);
                };
                let latest = directory
                    .retrieve_resource(&sub.owner, &sub.access_token, &resource_id)
                    .await?;
                if let Some(changed) = latest {
                    if self.wants(EventType::ResourceChanged) {
                        notifications.push((EventType::ResourceChanged, changed.content.to_value()?));
                    }
                }
            }
        }
        Ok(notifications)
    }

    pub fn seed_links(&self, links: &[Resource]) {
        let mut known = self.known_links.lock();
        known.clear();
        known.extend(links.iter().map(|r| (r.href.clone(), r.clone())));
    }

    pub fn seed_devices(&self, devices: &[DeviceRecord]) {
        let mut known = self.known_devices.lock();
        known.clear();
        known.extend(devices.iter().map(|d| (d.device_id.clone(), d.connection.status)));
    }

    /// Notifications produced by one source event.
    pub fn notifications(&self, event: &SourceEvent) -> HubResult<Vec<Notification>> {
        let notification = match event {
            SourceEvent::ResourceChanged(changed) => {
                if !self.wants(EventType::ResourceChanged) {
                    return Ok(Vec::new());
                }
                Some((EventType::ResourceChanged, changed.content.to_value()?))
            }
            SourceEvent::ResourceLinksPublished(published) => {
                let mut known = self.known_links.lock();
                let changed: Vec<&Resource> = published
                    .resources
                    .iter()
                    .filter(|r| known.get(&r.href) != Some(*r))
                    .collect();
                for resource in &changed {
                    known.insert(resource.href.clone(), (*resource).clone());
                }
                (self.wants(EventType::ResourcesPublished) && !changed.is_empty())
                    .then(|| serde_json::to_value(&changed))
                    .transpose()?
                    .map(|links| (EventType::ResourcesPublished, links))
            }
            SourceEvent::ResourceLinksUnpublished(unpublished) => {
                let mut known = self.known_links.lock();
                let hrefs: Vec<String> = if unpublished.hrefs.is_empty() {
                    known.keys().cloned().collect()
                } else {
                    unpublished.hrefs.clone()
                };
                let removed: Vec<Resource> =
                    hrefs.iter().filter_map(|href| known.remove(href)).collect();
                (self.wants(EventType::ResourcesUnpublished) && !removed.is_empty())
                    .then(|| serde_json::to_value(&removed))
                    .transpose()?
                    .map(|links| (EventType::ResourcesUnpublished, links))
            }
            SourceEvent::DeviceMetadataUpdated(updated) => {
                if updated.canceled {
                    return Ok(Vec::new());
                }
                let status = updated.connection.status;
                let previous = self
                    .known_devices
                    .lock()
                    .insert(updated.device_id.clone(), status);
                if previous == Some(status) {
                    return Ok(Vec::new());
                }
                let event_type = match status {
                    ConnectionStatus::Online => EventType::DevicesOnline,
                    ConnectionStatus::Offline => EventType::DevicesOffline,
                };
                self.wants(event_type)
                    .then(|| (event_type, device_list([&updated.device_id])))
            }
            SourceEvent::Registration(RegistrationEvent::DevicesRegistered { device_ids, .. }) => {
                let mut known = self.known_devices.lock();
                for id in device_ids {
                    known.entry(id.clone()).or_default();
                }
                self.wants(EventType::DevicesRegistered)
                    .then(|| (EventType::DevicesRegistered, device_list(device_ids)))
            }
            SourceEvent::Registration(RegistrationEvent::DevicesUnregistered {
                device_ids, ..
            }) => {
                let mut known = self.known_devices.lock();
                for id in device_ids {
                    known.remove(id);
                }
                self.wants(EventType::DevicesUnregistered)
                    .then(|| (EventType::DevicesUnregistered, device_list(device_ids)))
            }
        };
        Ok(notification.into_iter().collect())
    }

    /// Sends one notification with the next sequence number.
    ///
    /// Returns `false` once the subscription has been torn down.
    pub async fn deliver(&self, event_type: EventType, payload: &Value) -> HubResult<bool> {
        let sequence_number = self.data.next_sequence_number(self.store.as_ref()).await?;
        let sub = self.data.subscription();
        let outcome = self
            .emitter
            .emit(&sub, sequence_number, event_type, Some(payload))
            .await;
        match outcome.result {
            Ok(()) => Ok(true),
            Err(e) if outcome.remove => {
                self.teardown.invoke(&sub.id, e);
                Ok(false)
            }
            Err(e) => {
                warn!(
                    subscription_id = %sub.id,
                    event_type = %event_type,
                    sequence_number,
                    error = %e,
                    "cannot deliver notification"
                );
                Ok(true)
            }
        }
    }

    /// Delivers notifications in order until the subscription is removed.
    ///
    /// Returns `false` if delivery stopped because of a teardown.
    pub async fn deliver_all(&self, notifications: Vec<Notification>) -> HubResult<bool> {
        for (event_type, payload) in notifications {
            if !self.deliver(event_type, &payload).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl SourceHandler for SubscriptionHandler {
    async fn handle(&self, event: SourceEvent) -> HubResult<()> {
        let notifications = self.notifications(&event)?;
        self.deliver_all(notifications).await.map(|_| ())
    }

    fn on_close(&self) {
        debug!(subscription_id = %self.data.id(), "live subscription closed");
        self.data.disconnected(self.connection);
    }

    fn on_error(&self, err: HubError) {
        if err.is_transient_transport() {
            debug!(subscription_id = %self.data.id(), error = %err, "live subscription interrupted");
            self.data.disconnected(self.connection);
            return;
        }
        self.teardown.invoke(self.data.id(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud2cloud::store::InMemorySubscriptionStore;
    use crate::cloud2cloud::subscription::Subscription;
    use crate::events::{
        AuditContext, Connection, DeviceMetadataUpdated, EventMetadata, ResourceLinksPublished,
        ResourceLinksUnpublished, ShadowSynchronization,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn handler(subscription_type: SubscriptionType, event_types: Vec<EventType>) -> SubscriptionHandler {
        let mut sub = Subscription::new(
            subscription_type,
            "http://localhost/events",
            event_types,
            "secret",
            "alice",
        );
        if subscription_type != SubscriptionType::Devices {
            sub.device_id = "dev-1".into();
        }
        SubscriptionHandler::new(
            Arc::new(SubscriptionData::new(sub)),
            0,
            Arc::new(InMemorySubscriptionStore::new()),
            EventEmitter::new(Duration::from_secs(1)).unwrap(),
            Teardown::new(|_, _| {}),
        )
    }

    fn published(hrefs: &[&str]) -> SourceEvent {
        SourceEvent::ResourceLinksPublished(ResourceLinksPublished {
            device_id: "dev-1".into(),
            resources: hrefs.iter().map(|h| Resource::new("dev-1", *h)).collect(),
            audit_context: AuditContext::default(),
            event_metadata: EventMetadata::default(),
        })
    }

    fn unpublished(hrefs: &[&str]) -> SourceEvent {
        SourceEvent::ResourceLinksUnpublished(ResourceLinksUnpublished {
            device_id: "dev-1".into(),
            hrefs: hrefs.iter().map(|h| h.to_string()).collect(),
            audit_context: AuditContext::default(),
            event_metadata: EventMetadata::default(),
        })
    }

    fn connection(status: Connection) -> SourceEvent {
        SourceEvent::DeviceMetadataUpdated(DeviceMetadataUpdated {
            device_id: "dev-1".into(),
            connection: status,
            shadow_synchronization: ShadowSynchronization::Unset,
            canceled: false,
            audit_context: AuditContext::default(),
            event_metadata: EventMetadata::default(),
        })
    }

    #[test]
    fn test_published_links_are_filtered_to_changes() {
        let handler = handler(
            SubscriptionType::Device,
            vec![EventType::ResourcesPublished, EventType::ResourcesUnpublished],
        );
        handler.seed_links(&[Resource::new("dev-1", "/a")]);

        let notifications = handler.notifications(&published(&["/a", "/b"])).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, EventType::ResourcesPublished);
        assert_eq!(notifications[0].1[0]["href"], "/b");

        assert!(handler.notifications(&published(&["/b"])).unwrap().is_empty());
    }

    #[test]
    fn test_unpublished_reports_only_known_links() {
        let handler = handler(SubscriptionType::Device, vec![EventType::ResourcesUnpublished]);
        handler.seed_links(&[Resource::new("dev-1", "/a"), Resource::new("dev-1", "/b")]);

        assert!(handler.notifications(&unpublished(&["/zzz"])).unwrap().is_empty());

        let notifications = handler.notifications(&unpublished(&[])).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].1.as_array().unwrap().len(), 2);
        assert!(handler.notifications(&unpublished(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_connection_changes_only() {
        let handler = handler(
            SubscriptionType::Devices,
            vec![EventType::DevicesOnline, EventType::DevicesOffline],
        );

        let online = handler.notifications(&connection(Connection::online())).unwrap();
        assert_eq!(online, vec![(EventType::DevicesOnline, json!([{"di": "dev-1"}]))]);
        assert!(handler.notifications(&connection(Connection::online())).unwrap().is_empty());

        let offline = handler.notifications(&connection(Connection::offline())).unwrap();
        assert_eq!(offline[0].0, EventType::DevicesOffline);
    }

    #[test]
    fn test_unrequested_event_types_are_dropped() {
        let handler = handler(SubscriptionType::Devices, vec![EventType::DevicesRegistered]);
        assert!(handler.notifications(&connection(Connection::online())).unwrap().is_empty());

        let registered = SourceEvent::Registration(RegistrationEvent::DevicesRegistered {
            owner: "alice".into(),
            device_ids: vec!["dev-2".into()],
        });
        assert_eq!(
            handler.notifications(&registered).unwrap(),
            vec![(EventType::DevicesRegistered, json!([{"di": "dev-2"}]))]
        );
    }
}

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Hub Domain Events
//!
//! Every state change of a device, resource, resource directory or hub
//! service is an immutable event. Events are grouped by device (`group_id`)
//! and ordered within their aggregate by `EventMetadata::version`.
//!
//! # Event Flow
//!
//! ```text
//! Command → Aggregate → HubEvent → EventEnvelope → EventStore / Event bus
//!   (intent)  (validate)  (fact)     (stored form)   (persist)  (broadcast)
//! ```
//!
//! # Stored Form
//!
//! [`EventEnvelope`] carries the event type name next to the JSON payload so
//! replay can skip event types it does not know (forward compatibility)
//! while still failing hard on payloads it cannot decode.
//!
//! # Module Organization
//!
//! - [`metadata`] - ordering metadata and audit context
//! - [`resource`] - resource identity and resource links
//! - [`resource_state`] - per-resource request lifecycle events
//! - [`resource_links`] - device resource directory events
//! - [`device_metadata`] - connection and shadow synchronization events
//! - [`service_metadata`] - hub service heartbeat events

pub mod device_metadata;
pub mod metadata;
pub mod resource;
pub mod resource_links;
pub mod resource_state;
pub mod service_metadata;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{
    DeviceMetadataSnapshotTaken, ResourceLinksSnapshotTaken, ResourceStateSnapshotTaken,
    ServiceMetadataSnapshotTaken,
};
use crate::errors::{HubError, HubResult};

pub use device_metadata::{
    Connection, ConnectionStatus, DeviceMetadataUpdatePending, DeviceMetadataUpdated,
    ShadowSynchronization,
};
pub use metadata::{AuditContext, EventMetadata};
pub use resource::{normalize_href, EndpointInformation, Policy, Resource, ResourceId};
pub use resource_links::{ResourceLinksPublished, ResourceLinksUnpublished};
pub use resource_state::{
    ResourceChanged, ResourceCreatePending, ResourceCreated, ResourceDeletePending,
    ResourceDeleted, ResourceRetrievePending, ResourceRetrieved, ResourceUpdatePending,
    ResourceUpdated,
};
pub use service_metadata::{ServiceHeartbeat, ServiceMetadataUpdated, ServicesHeartbeat};

/// Identity and ordering contract shared by every event type
pub trait DomainEvent: Clone + Serialize + DeserializeOwned {
    /// Stable name stored next to the payload
    const EVENT_TYPE: &'static str;

    fn event_metadata(&self) -> &EventMetadata;

    /// Attribution; snapshots carry none of their own.
    fn audit_context(&self) -> Option<&AuditContext>;

    fn aggregate_id(&self) -> Uuid;

    fn group_id(&self) -> &str;

    fn is_snapshot(&self) -> bool {
        false
    }

    /// Whether all identity fields are populated.
    fn check_initialized(&self) -> bool;

    fn version(&self) -> u64 {
        self.event_metadata().version
    }
}

macro_rules! hub_events {
    ($($variant:ident),+ $(,)?) => {
        /// Closed union of every event the hub produces
        #[derive(Debug, Clone, PartialEq)]
        pub enum HubEvent {
            $($variant($variant),)+
        }

        impl HubEvent {
            pub fn event_type(&self) -> &'static str {
                match self {
                    $(HubEvent::$variant(_) => <$variant as DomainEvent>::EVENT_TYPE,)+
                }
            }

            pub fn event_metadata(&self) -> &EventMetadata {
                match self {
                    $(HubEvent::$variant(e) => e.event_metadata(),)+
                }
            }

            pub fn audit_context(&self) -> Option<&AuditContext> {
                match self {
                    $(HubEvent::$variant(e) => e.audit_context(),)+
                }
            }

            pub fn aggregate_id(&self) -> Uuid {
                match self {
                    $(HubEvent::$variant(e) => e.aggregate_id(),)+
                }
            }

            pub fn group_id(&self) -> &str {
                match self {
                    $(HubEvent::$variant(e) => e.group_id(),)+
                }
            }

            pub fn is_snapshot(&self) -> bool {
                match self {
                    $(HubEvent::$variant(e) => e.is_snapshot(),)+
                }
            }

            pub fn check_initialized(&self) -> bool {
                match self {
                    $(HubEvent::$variant(e) => e.check_initialized(),)+
                }
            }

            fn payload(&self) -> HubResult<serde_json::Value> {
                match self {
                    $(HubEvent::$variant(e) => Ok(serde_json::to_value(e)?),)+
                }
            }

            /// Decodes a stored payload; `None` for unknown event types.
            fn from_payload(event_type: &str, data: &serde_json::Value) -> HubResult<Option<Self>> {
                $(
                    if event_type == <$variant as DomainEvent>::EVENT_TYPE {
                        let event = serde_json::from_value::<$variant>(data.clone()).map_err(|e| {
                            HubError::Internal(format!("cannot unmarshal event {event_type}: {e}"))
                        })?;
                        return Ok(Some(HubEvent::$variant(event)));
                    }
                )+
                Ok(None)
            }
        }

        $(
            impl From<$variant> for HubEvent {
                fn from(event: $variant) -> Self {
                    HubEvent::$variant(event)
                }
            }
        )+
    };
}

hub_events!(
    ResourceChanged,
    ResourceUpdatePending,
    ResourceUpdated,
    ResourceRetrievePending,
    ResourceRetrieved,
    ResourceDeletePending,
    ResourceDeleted,
    ResourceCreatePending,
    ResourceCreated,
    ResourceStateSnapshotTaken,
    ResourceLinksPublished,
    ResourceLinksUnpublished,
    ResourceLinksSnapshotTaken,
    DeviceMetadataUpdatePending,
    DeviceMetadataUpdated,
    DeviceMetadataSnapshotTaken,
    ServiceMetadataUpdated,
    ServiceMetadataSnapshotTaken,
);

impl HubEvent {
    pub fn version(&self) -> u64 {
        self.event_metadata().version
    }

    /// Owner recorded in the audit context, if any.
    pub fn owner(&self) -> &str {
        self.audit_context().map(|a| a.owner.as_str()).unwrap_or("")
    }
}

/// Stored and transported form of a [`HubEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub group_id: String,
    pub version: u64,
    pub is_snapshot: bool,
    /// Unix nanoseconds
    pub timestamp: i64,
    #[serde(default)]
    pub owner: String,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn encode(event: &HubEvent) -> HubResult<Self> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id(),
            group_id: event.group_id().to_string(),
            version: event.version(),
            is_snapshot: event.is_snapshot(),
            timestamp: event.event_metadata().timestamp,
            owner: event.owner().to_string(),
            data: event.payload()?,
        })
    }

    /// Decodes the payload.
    ///
    /// # Errors
    ///
    /// - `Internal` for an empty event type or an undecodable payload
    ///
    /// Unknown event types yield `Ok(None)`.
    pub fn decode(&self) -> HubResult<Option<HubEvent>> {
        if self.event_type.is_empty() {
            return Err(HubError::Internal(format!(
                "event of aggregate {} version {} has no event type",
                self.aggregate_id, self.version
            )));
        }
        HubEvent::from_payload(&self.event_type, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Status, APPLICATION_JSON};
    use chrono::{DateTime, Utc};

    fn fixed_timestamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn resource_changed() -> ResourceChanged {
        ResourceChanged {
            resource_id: ResourceId::new("dev-1", "/light/1"),
            content: Content::new(APPLICATION_JSON, b"{\"power\":1}".to_vec()),
            status: Status::Ok,
            audit_context: AuditContext::new("user", "corr", "owner-1"),
            event_metadata: EventMetadata::new(4, "conn-1", 9, "hub-1", fixed_timestamp()),
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        let event = HubEvent::from(resource_changed());
        let envelope = EventEnvelope::encode(&event).unwrap();

        assert_eq!(envelope.event_type, "resourcechanged");
        assert_eq!(envelope.group_id, "dev-1");
        assert_eq!(envelope.version, 4);
        assert_eq!(envelope.owner, "owner-1");
        assert!(!envelope.is_snapshot);
        assert_eq!(envelope.decode().unwrap(), Some(event));
    }

    #[test]
    fn test_unknown_event_type_is_skipped() {
        let mut envelope = EventEnvelope::encode(&resource_changed().into()).unwrap();
        envelope.event_type = "somefutureevent".into();
        assert_eq!(envelope.decode().unwrap(), None);
    }

    #[test]
    fn test_empty_event_type_is_internal() {
        let mut envelope = EventEnvelope::encode(&resource_changed().into()).unwrap();
        envelope.event_type.clear();
        assert!(matches!(envelope.decode(), Err(HubError::Internal(_))));
    }

    #[test]
    fn test_undecodable_payload_is_internal() {
        let mut envelope = EventEnvelope::encode(&resource_changed().into()).unwrap();
        envelope.data = serde_json::json!({"garbage": true});
        assert!(matches!(envelope.decode(), Err(HubError::Internal(_))));
    }

    #[test]
    fn test_check_initialized() {
        let mut event = resource_changed();
        assert!(event.check_initialized());
        event.resource_id.device_id.clear();
        assert!(!HubEvent::from(event).check_initialized());
    }
}

// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for hub events
//!
//! Defines the subject patterns used to route published hub events and to
//! persist aggregate streams.
//!
//! # Subject Pattern
//!
//! ```text
//! hub.owners.{owner}.devices.{device}.{event_type}
//! hub.owners.{owner}.devices.{device}.resources.{resource}.{event_type}
//! hub.owners.{owner}.registrations
//! hub.services.{hub}.{event_type}
//! hubstore.{group}.{aggregate}.{event_type}
//! ```
//!
//! This allows for:
//! - Owner-wide subscriptions (`hub.owners.{owner}.devices.*.devicemetadataupdated`)
//! - Device-level wildcards (`hub.owners.{owner}.devices.{device}.>`)
//! - Per-aggregate replay filters (`hubstore.{group}.{aggregate}.>`)
//!
//! # Examples
//!
//! ```rust
//! use ocf_cloud_hub::subjects::SubjectBuilder;
//!
//! let subject = SubjectBuilder::new("alice")
//!     .device("dev-1")
//!     .event_type("resourcelinkspublished")
//!     .build();
//! assert_eq!(subject, "hub.owners.alice.devices.dev-1.resourcelinkspublished");
//!
//! let wildcard = SubjectBuilder::new("alice").device("dev-1").build_wildcard();
//! assert_eq!(wildcard, "hub.owners.alice.devices.dev-1.>");
//! ```

use uuid::Uuid;

use crate::events::HubEvent;

/// Root namespace of published hub events
pub const HUB_ROOT: &str = "hub";
/// Root namespace of persisted aggregate streams
pub const EVENT_STORE_ROOT: &str = "hubstore";

/// Makes an arbitrary identifier usable as a single subject token.
pub fn token(value: &str) -> String {
    if value.is_empty() {
        return "_".to_string();
    }
    value
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' | '\t' | '\r' | '\n' => '_',
            c => c,
        })
        .collect()
}

/// Builder for owner-scoped event subjects
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    owner: String,
    device_id: Option<String>,
    resource: Option<Uuid>,
    event_type: Option<String>,
}

impl SubjectBuilder {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: token(owner),
            device_id: None,
            resource: None,
            event_type: None,
        }
    }

    pub fn device(mut self, device_id: &str) -> Self {
        self.device_id = Some(token(device_id));
        self
    }

    /// Scope to one resource aggregate (implies a device scope).
    pub fn resource(mut self, resource: Uuid) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn event_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(token(event_type));
        self
    }

    fn prefix(&self) -> String {
        let mut subject = format!("{HUB_ROOT}.owners.{}.devices", self.owner);
        subject.push('.');
        subject.push_str(self.device_id.as_deref().unwrap_or("*"));
        if let Some(resource) = self.resource {
            subject.push_str(&format!(".resources.{resource}"));
        }
        subject
    }

    /// Complete subject. A missing device matches any device, a missing
    /// event type any event type.
    pub fn build(self) -> String {
        let event_type = self.event_type.clone().unwrap_or_else(|| "*".to_string());
        format!("{}.{}", self.prefix(), event_type)
    }

    /// Everything below the scope: `hub.owners.{owner}.devices.{device}.>`
    pub fn build_wildcard(self) -> String {
        format!("{}.>", self.prefix())
    }
}

/// Subject devices registration changes of an owner are announced on.
pub fn registrations(owner: &str) -> String {
    format!("{HUB_ROOT}.owners.{}.registrations", token(owner))
}

/// Subject a published event is routed to.
pub fn event_subject(event: &HubEvent) -> String {
    match event {
        HubEvent::ServiceMetadataUpdated(_) | HubEvent::ServiceMetadataSnapshotTaken(_) => format!(
            "{HUB_ROOT}.services.{}.{}",
            token(&event.event_metadata().hub_id),
            event.event_type()
        ),
        HubEvent::ResourceLinksPublished(_)
        | HubEvent::ResourceLinksUnpublished(_)
        | HubEvent::ResourceLinksSnapshotTaken(_)
        | HubEvent::DeviceMetadataUpdatePending(_)
        | HubEvent::DeviceMetadataUpdated(_)
        | HubEvent::DeviceMetadataSnapshotTaken(_) => SubjectBuilder::new(event.owner())
            .device(event.group_id())
            .event_type(event.event_type())
            .build(),
        _ => SubjectBuilder::new(event.owner())
            .device(event.group_id())
            .resource(event.aggregate_id())
            .event_type(event.event_type())
            .build(),
    }
}

/// Subject an aggregate event is persisted under.
pub fn store_subject(group_id: &str, aggregate_id: Uuid, event_type: &str) -> String {
    format!(
        "{EVENT_STORE_ROOT}.{}.{aggregate_id}.{}",
        token(group_id),
        token(event_type)
    )
}

/// Replay filter of one aggregate stream.
pub fn store_aggregate_filter(group_id: &str, aggregate_id: Uuid) -> String {
    format!("{EVENT_STORE_ROOT}.{}.{aggregate_id}.>", token(group_id))
}

/// Replay filter of every aggregate of a group.
pub fn store_group_filter(group_id: &str) -> String {
    format!("{EVENT_STORE_ROOT}.{}.>", token(group_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_builder() {
        let subject = SubjectBuilder::new("alice")
            .device("dev-1")
            .event_type("devicemetadataupdated")
            .build();
        assert_eq!(subject, "hub.owners.alice.devices.dev-1.devicemetadataupdated");
    }

    #[test]
    fn test_owner_wide_subject() {
        let subject = SubjectBuilder::new("alice")
            .event_type("devicemetadataupdated")
            .build();
        assert_eq!(subject, "hub.owners.alice.devices.*.devicemetadataupdated");
    }

    #[test]
    fn test_resource_subject() {
        let id = Uuid::nil();
        let subject = SubjectBuilder::new("alice")
            .device("dev-1")
            .resource(id)
            .event_type("resourcechanged")
            .build();
        assert_eq!(
            subject,
            format!("hub.owners.alice.devices.dev-1.resources.{id}.resourcechanged")
        );
    }

    #[test]
    fn test_tokens_are_sanitized() {
        assert_eq!(token("a.b*c>d e"), "a_b_c_d_e");
        assert_eq!(token(""), "_");
        assert_eq!(registrations("x.y"), "hub.owners.x_y.registrations");
    }

    #[test]
    fn test_store_subjects() {
        let id = Uuid::nil();
        assert_eq!(
            store_subject("dev-1", id, "resourcechanged"),
            format!("hubstore.dev-1.{id}.resourcechanged")
        );
        assert_eq!(store_aggregate_filter("dev-1", id), format!("hubstore.dev-1.{id}.>"));
        assert_eq!(store_group_filter("dev-1"), "hubstore.dev-1.>");
    }
}

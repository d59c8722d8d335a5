// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource State Events
//!
//! Events of the per-resource aggregate. Every request a client makes
//! against a device resource (update, retrieve, create, delete) is recorded
//! as a `*Pending` event and later resolved by the matching terminal event
//! once the device answers. `ResourceChanged` records device-reported state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::{Content, Status};
use crate::events::metadata::{AuditContext, EventMetadata};
use crate::events::resource::ResourceId;
use crate::events::DomainEvent;

/// Device reported a new representation of the resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChanged {
    pub resource_id: ResourceId,
    pub content: Content,
    pub status: Status,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

/// Update requested, waiting for the device to confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdatePending {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub resource_interface: String,
    pub content: Content,
    /// Unix nanoseconds; 0 means the request never times out.
    #[serde(default)]
    pub valid_until: i64,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdated {
    pub resource_id: ResourceId,
    pub content: Content,
    pub status: Status,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRetrievePending {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub resource_interface: String,
    #[serde(default)]
    pub valid_until: i64,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRetrieved {
    pub resource_id: ResourceId,
    pub content: Content,
    pub status: Status,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDeletePending {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub valid_until: i64,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDeleted {
    pub resource_id: ResourceId,
    pub content: Content,
    pub status: Status,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCreatePending {
    pub resource_id: ResourceId,
    pub content: Content,
    #[serde(default)]
    pub valid_until: i64,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCreated {
    pub resource_id: ResourceId,
    pub content: Content,
    pub status: Status,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

macro_rules! impl_resource_event {
    ($ty:ident, $name:literal) => {
        impl DomainEvent for $ty {
            const EVENT_TYPE: &'static str = $name;

            fn event_metadata(&self) -> &EventMetadata {
                &self.event_metadata
            }

            fn audit_context(&self) -> Option<&AuditContext> {
                Some(&self.audit_context)
            }

            fn aggregate_id(&self) -> Uuid {
                self.resource_id.to_uuid()
            }

            fn group_id(&self) -> &str {
                &self.resource_id.device_id
            }

            fn check_initialized(&self) -> bool {
                self.resource_id.is_initialized() && self.event_metadata.timestamp != 0
            }
        }
    };
}

impl_resource_event!(ResourceChanged, "resourcechanged");
impl_resource_event!(ResourceUpdatePending, "resourceupdatepending");
impl_resource_event!(ResourceUpdated, "resourceupdated");
impl_resource_event!(ResourceRetrievePending, "resourceretrievepending");
impl_resource_event!(ResourceRetrieved, "resourceretrieved");
impl_resource_event!(ResourceDeletePending, "resourcedeletepending");
impl_resource_event!(ResourceDeleted, "resourcedeleted");
impl_resource_event!(ResourceCreatePending, "resourcecreatepending");
impl_resource_event!(ResourceCreated, "resourcecreated");

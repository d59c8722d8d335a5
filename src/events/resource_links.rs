// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Links Events
//!
//! A device's resource directory changes through publish and unpublish
//! events. `ResourceLinksPublished` carries the full set the device sent,
//! not only the links that are new to the directory; consumers filter.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::metadata::{AuditContext, EventMetadata};
use crate::events::resource::{Resource, ResourceId};
use crate::events::DomainEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLinksPublished {
    pub device_id: String,
    pub resources: Vec<Resource>,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

/// Links removed from a device's directory
///
/// `hrefs` lists exactly the links that were removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLinksUnpublished {
    pub device_id: String,
    pub hrefs: Vec<String>,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

impl DomainEvent for ResourceLinksPublished {
    const EVENT_TYPE: &'static str = "resourcelinkspublished";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        Some(&self.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        ResourceId::links(self.device_id.clone()).to_uuid()
    }

    fn group_id(&self) -> &str {
        &self.device_id
    }

    fn check_initialized(&self) -> bool {
        !self.device_id.is_empty() && self.event_metadata.timestamp != 0
    }
}

impl DomainEvent for ResourceLinksUnpublished {
    const EVENT_TYPE: &'static str = "resourcelinksunpublished";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        Some(&self.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        ResourceId::links(self.device_id.clone()).to_uuid()
    }

    fn group_id(&self) -> &str {
        &self.device_id
    }

    fn check_initialized(&self) -> bool {
        !self.device_id.is_empty() && self.event_metadata.timestamp != 0
    }
}

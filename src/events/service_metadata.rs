// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Metadata Events
//!
//! Heartbeats of hub service instances. The whole valid/expired split is
//! carried by every update so consumers never have to merge deltas.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::metadata::{AuditContext, EventMetadata};
use crate::events::DomainEvent;

/// Group id shared by every service metadata aggregate
pub const SERVICES_GROUP_ID: &str = "services";

/// Aggregate id of the service metadata aggregate of a hub.
pub fn service_metadata_aggregate_id(hub_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{hub_id}/services").as_bytes())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHeartbeat {
    pub service_id: String,
    /// Nanoseconds
    pub time_to_live: i64,
    /// Unix nanoseconds
    pub heartbeat_valid_until: i64,
}

/// Service instances split into live and expired sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesHeartbeat {
    #[serde(default)]
    pub valid: Vec<ServiceHeartbeat>,
    #[serde(default)]
    pub expired: Vec<ServiceHeartbeat>,
}

impl ServicesHeartbeat {
    pub fn find_valid(&self, service_id: &str) -> Option<&ServiceHeartbeat> {
        self.valid.iter().find(|s| s.service_id == service_id)
    }

    pub fn find_expired(&self, service_id: &str) -> Option<&ServiceHeartbeat> {
        self.expired.iter().find(|s| s.service_id == service_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadataUpdated {
    pub services_heartbeat: ServicesHeartbeat,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

impl DomainEvent for ServiceMetadataUpdated {
    const EVENT_TYPE: &'static str = "servicemetadataupdated";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        Some(&self.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        service_metadata_aggregate_id(&self.event_metadata.hub_id)
    }

    fn group_id(&self) -> &str {
        SERVICES_GROUP_ID
    }

    fn check_initialized(&self) -> bool {
        !self.event_metadata.hub_id.is_empty() && self.event_metadata.timestamp != 0
    }
}

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Device Metadata Events
//!
//! Connection status is self-reported by the device and applied directly.
//! Shadow synchronization changes go through a pending phase that the
//! device confirms by correlation id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::metadata::{AuditContext, EventMetadata};
use crate::events::resource::ResourceId;
use crate::events::DomainEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    #[default]
    Offline,
    Online,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub status: ConnectionStatus,
    /// Unix nanoseconds until which an online status is trusted; 0 = always.
    #[serde(default)]
    pub online_valid_until: i64,
}

impl Connection {
    pub fn online() -> Self {
        Self {
            status: ConnectionStatus::Online,
            online_valid_until: 0,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.status == ConnectionStatus::Online
    }
}

/// Whether the hub keeps a synchronized twin of the device's resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShadowSynchronization {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadataUpdatePending {
    pub device_id: String,
    pub shadow_synchronization: ShadowSynchronization,
    #[serde(default)]
    pub valid_until: i64,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadataUpdated {
    pub device_id: String,
    #[serde(default)]
    pub connection: Connection,
    #[serde(default)]
    pub shadow_synchronization: ShadowSynchronization,
    /// Set when the update resolves a canceled pending request.
    #[serde(default)]
    pub canceled: bool,
    pub audit_context: AuditContext,
    pub event_metadata: EventMetadata,
}

impl DeviceMetadataUpdated {
    /// Whether both events describe the same device metadata.
    pub fn same_metadata(&self, other: &DeviceMetadataUpdated) -> bool {
        self.connection == other.connection
            && self.shadow_synchronization == other.shadow_synchronization
            && self.canceled == other.canceled
    }
}

impl DomainEvent for DeviceMetadataUpdatePending {
    const EVENT_TYPE: &'static str = "devicemetadataupdatepending";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        Some(&self.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        ResourceId::device_metadata(self.device_id.clone()).to_uuid()
    }

    fn group_id(&self) -> &str {
        &self.device_id
    }

    fn check_initialized(&self) -> bool {
        !self.device_id.is_empty()
            && !self.audit_context.correlation_id.is_empty()
            && self.event_metadata.timestamp != 0
    }
}

impl DomainEvent for DeviceMetadataUpdated {
    const EVENT_TYPE: &'static str = "devicemetadataupdated";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        Some(&self.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        ResourceId::device_metadata(self.device_id.clone()).to_uuid()
    }

    fn group_id(&self) -> &str {
        &self.device_id
    }

    fn check_initialized(&self) -> bool {
        !self.device_id.is_empty() && self.event_metadata.timestamp != 0
    }
}

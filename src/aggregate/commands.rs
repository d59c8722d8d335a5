// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate Commands
//!
//! Commands express intent and can be rejected by the aggregate that
//! receives them. Each aggregate accepts a closed enum of commands.
//!
//! # Time Handling
//!
//! Aggregates never read the clock. The wall-clock instant a command is
//! handled at travels in [`CommandContext::now`], which keeps replay and
//! tests deterministic.

use chrono::{DateTime, Duration, Utc};

use crate::content::{Content, Status};
use crate::errors::{HubError, HubResult};
use crate::events::metadata::{unix_nanos, AuditContext, EventMetadata};
use crate::events::{Connection, Resource, ResourceId, ShadowSynchronization};

/// Connection identity of the device or service that issued a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMetadata {
    pub connection_id: String,
    pub sequence: u64,
}

impl CommandMetadata {
    pub fn new(connection_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            connection_id: connection_id.into(),
            sequence,
        }
    }
}

/// Ambient facts every command is handled under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub owner: String,
    pub user_id: String,
    pub hub_id: String,
    pub now: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(
        owner: impl Into<String>,
        user_id: impl Into<String>,
        hub_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner: owner.into(),
            user_id: user_id.into(),
            hub_id: hub_id.into(),
            now,
        }
    }

    pub fn audit_context(&self, correlation_id: &str) -> AuditContext {
        AuditContext::new(self.user_id.clone(), correlation_id, self.owner.clone())
    }

    pub(crate) fn event_metadata(&self, version: u64, metadata: &CommandMetadata) -> EventMetadata {
        EventMetadata::new(
            version,
            metadata.connection_id.clone(),
            metadata.sequence,
            self.hub_id.clone(),
            self.now,
        )
    }

    /// Unix nanoseconds of `now`.
    pub fn now_nanos(&self) -> i64 {
        unix_nanos(self.now)
    }

    /// Absolute deadline for a relative time-to-live; 0 when unbounded.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when the deadline is beyond the representable time
    pub fn valid_until(&self, time_to_live: Duration) -> HubResult<i64> {
        if time_to_live <= Duration::zero() {
            return Ok(0);
        }
        deadline(self.now, time_to_live).map(unix_nanos)
    }
}

/// `now + time_to_live`, rejecting deadlines chrono cannot represent.
pub(crate) fn deadline(now: DateTime<Utc>, time_to_live: Duration) -> HubResult<DateTime<Utc>> {
    now.checked_add_signed(time_to_live).ok_or_else(|| {
        HubError::InvalidArgument(format!("time to live {time_to_live} is out of range"))
    })
}

pub(crate) fn require_metadata(metadata: &Option<CommandMetadata>) -> HubResult<&CommandMetadata> {
    metadata
        .as_ref()
        .ok_or_else(|| HubError::InvalidArgument("command metadata is required".to_string()))
}

// ---------------------------------------------------------------------------
// Resource state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyResourceChangedRequest {
    pub resource_id: ResourceId,
    pub content: Content,
    pub status: Status,
    pub correlation_id: String,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResourceRequest {
    pub resource_id: ResourceId,
    pub resource_interface: String,
    pub content: Content,
    pub correlation_id: String,
    pub time_to_live: Duration,
    pub command_metadata: Option<CommandMetadata>,
}

/// Device answer to a pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmResourceRequest {
    pub resource_id: ResourceId,
    pub correlation_id: String,
    pub content: Content,
    pub status: Status,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveResourceRequest {
    pub resource_id: ResourceId,
    pub resource_interface: String,
    pub correlation_id: String,
    pub time_to_live: Duration,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResourceRequest {
    pub resource_id: ResourceId,
    pub correlation_id: String,
    pub time_to_live: Duration,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResourceRequest {
    pub resource_id: ResourceId,
    pub content: Content,
    pub correlation_id: String,
    pub time_to_live: Duration,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStateCommand {
    NotifyResourceChanged(NotifyResourceChangedRequest),
    UpdateResource(UpdateResourceRequest),
    ConfirmResourceUpdate(ConfirmResourceRequest),
    RetrieveResource(RetrieveResourceRequest),
    ConfirmResourceRetrieve(ConfirmResourceRequest),
    DeleteResource(DeleteResourceRequest),
    ConfirmResourceDelete(ConfirmResourceRequest),
    CreateResource(CreateResourceRequest),
    ConfirmResourceCreate(ConfirmResourceRequest),
}

impl ResourceStateCommand {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            ResourceStateCommand::NotifyResourceChanged(r) => &r.resource_id,
            ResourceStateCommand::UpdateResource(r) => &r.resource_id,
            ResourceStateCommand::RetrieveResource(r) => &r.resource_id,
            ResourceStateCommand::DeleteResource(r) => &r.resource_id,
            ResourceStateCommand::CreateResource(r) => &r.resource_id,
            ResourceStateCommand::ConfirmResourceUpdate(r)
            | ResourceStateCommand::ConfirmResourceRetrieve(r)
            | ResourceStateCommand::ConfirmResourceDelete(r)
            | ResourceStateCommand::ConfirmResourceCreate(r) => &r.resource_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource links
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResourceLinksRequest {
    pub device_id: String,
    pub resources: Vec<Resource>,
    pub correlation_id: String,
    pub command_metadata: Option<CommandMetadata>,
}

/// Empty `hrefs` unpublishes every link of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpublishResourceLinksRequest {
    pub device_id: String,
    pub hrefs: Vec<String>,
    pub correlation_id: String,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLinksCommand {
    Publish(PublishResourceLinksRequest),
    Unpublish(UnpublishResourceLinksRequest),
}

// ---------------------------------------------------------------------------
// Device metadata
// ---------------------------------------------------------------------------

/// What an update of device metadata changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMetadataUpdate {
    /// Self-reported connectivity, applied immediately
    Connection(Connection),
    /// Requested twin mode, applied once the device confirms
    ShadowSynchronization(ShadowSynchronization),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDeviceMetadataRequest {
    pub device_id: String,
    pub update: DeviceMetadataUpdate,
    pub correlation_id: String,
    pub time_to_live: Duration,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDeviceMetadataUpdateRequest {
    pub device_id: String,
    pub correlation_id: String,
    pub status: Status,
    pub command_metadata: Option<CommandMetadata>,
}

/// Empty `correlation_id_filter` cancels every pending update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelPendingMetadataUpdatesRequest {
    pub device_id: String,
    pub correlation_id_filter: Vec<String>,
    pub correlation_id: String,
    pub command_metadata: Option<CommandMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMetadataCommand {
    Update(UpdateDeviceMetadataRequest),
    Confirm(ConfirmDeviceMetadataUpdateRequest),
    CancelPending(CancelPendingMetadataUpdatesRequest),
}

// ---------------------------------------------------------------------------
// Service metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHeartbeatRequest {
    pub service_id: String,
    pub time_to_live: Duration,
    /// When the service sent the heartbeat
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmExpiredServicesRequest {
    pub service_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMetadataCommand {
    Heartbeat(ServiceHeartbeatRequest),
    ConfirmExpiredServices(ConfirmExpiredServicesRequest),
}

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Device Metadata Aggregate
//!
//! Connection status is trusted as reported and applied at once. Shadow
//! synchronization changes are recorded as pending until the device
//! confirms them by correlation id, or until they are canceled.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::commands::*;
use crate::aggregate::AggregateModel;
use crate::errors::{HubError, HubResult};
use crate::events::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadataSnapshotTaken {
    pub device_id: String,
    #[serde(default)]
    pub device_metadata_updated: Option<DeviceMetadataUpdated>,
    #[serde(default)]
    pub update_pendings: Vec<DeviceMetadataUpdatePending>,
    pub event_metadata: EventMetadata,
}

impl DomainEvent for DeviceMetadataSnapshotTaken {
    const EVENT_TYPE: &'static str = "devicemetadatasnapshottaken";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        self.device_metadata_updated.as_ref().map(|u| &u.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        ResourceId::device_metadata(self.device_id.clone()).to_uuid()
    }

    fn group_id(&self) -> &str {
        &self.device_id
    }

    fn is_snapshot(&self) -> bool {
        true
    }

    fn check_initialized(&self) -> bool {
        !self.device_id.is_empty() && self.event_metadata.timestamp != 0
    }
}

impl DeviceMetadataSnapshotTaken {
    pub fn connection(&self) -> Connection {
        self.device_metadata_updated
            .as_ref()
            .map(|u| u.connection.clone())
            .unwrap_or_default()
    }

    pub fn shadow_synchronization(&self) -> ShadowSynchronization {
        self.device_metadata_updated
            .as_ref()
            .map(|u| u.shadow_synchronization)
            .unwrap_or_default()
    }

    pub fn find_pending(&self, correlation_id: &str) -> Option<&DeviceMetadataUpdatePending> {
        self.update_pendings
            .iter()
            .find(|p| p.audit_context.correlation_id == correlation_id)
    }

    fn updated(
        &self,
        ctx: &CommandContext,
        device_id: String,
        correlation_id: &str,
        event_metadata: EventMetadata,
    ) -> DeviceMetadataUpdated {
        DeviceMetadataUpdated {
            device_id,
            connection: self.connection(),
            shadow_synchronization: self.shadow_synchronization(),
            canceled: false,
            audit_context: ctx.audit_context(correlation_id),
            event_metadata,
        }
    }

    fn update_connection(
        &mut self,
        ctx: &CommandContext,
        req: UpdateDeviceMetadataRequest,
        connection: Connection,
        event_metadata: EventMetadata,
    ) -> HubResult<Vec<HubEvent>> {
        if let Some(current) = &self.device_metadata_updated {
            if !current.event_metadata.is_superseded_by(&event_metadata) {
                return Ok(Vec::new());
            }
        }
        let mut event = self.updated(ctx, req.device_id, &req.correlation_id, event_metadata);
        event.connection = connection;
        if let Some(current) = &self.device_metadata_updated {
            if current.same_metadata(&event) {
                return Ok(Vec::new());
            }
        }
        let event = HubEvent::from(event);
        self.handle_event(&event)?;
        Ok(vec![event])
    }

    fn request_shadow_synchronization(
        &mut self,
        ctx: &CommandContext,
        req: UpdateDeviceMetadataRequest,
        shadow_synchronization: ShadowSynchronization,
        event_metadata: EventMetadata,
    ) -> HubResult<Vec<HubEvent>> {
        if req.correlation_id.is_empty() {
            return Err(HubError::InvalidArgument(
                "correlationId is required for a shadow synchronization update".to_string(),
            ));
        }
        if self.find_pending(&req.correlation_id).is_some() {
            return Err(HubError::InvalidArgument(format!(
                "shadow synchronization update with correlationId({}) is already pending",
                req.correlation_id
            )));
        }
        let event = HubEvent::from(DeviceMetadataUpdatePending {
            device_id: req.device_id,
            shadow_synchronization,
            valid_until: ctx.valid_until(req.time_to_live)?,
            audit_context: ctx.audit_context(&req.correlation_id),
            event_metadata,
        });
        self.handle_event(&event)?;
        Ok(vec![event])
    }
}

impl AggregateModel for DeviceMetadataSnapshotTaken {
    type Command = DeviceMetadataCommand;

    fn handle_event(&mut self, event: &HubEvent) -> HubResult<()> {
        match event {
            HubEvent::DeviceMetadataUpdatePending(e) => {
                self.device_id = e.device_id.clone();
                self.event_metadata = e.event_metadata.clone();
                self.update_pendings.push(e.clone());
            }
            HubEvent::DeviceMetadataUpdated(e) => {
                self.device_id = e.device_id.clone();
                self.event_metadata = e.event_metadata.clone();
                let correlation_id = &e.audit_context.correlation_id;
                self.update_pendings
                    .retain(|p| p.audit_context.correlation_id != *correlation_id);
                self.device_metadata_updated = Some(e.clone());
            }
            HubEvent::DeviceMetadataSnapshotTaken(e) => *self = e.clone(),
            _ => {}
        }
        Ok(())
    }

    fn handle_command(
        &mut self,
        ctx: &CommandContext,
        command: DeviceMetadataCommand,
        new_version: u64,
    ) -> HubResult<Vec<HubEvent>> {
        match command {
            DeviceMetadataCommand::Update(req) => {
                let event_metadata =
                    ctx.event_metadata(new_version, require_metadata(&req.command_metadata)?);
                match req.update.clone() {
                    DeviceMetadataUpdate::Connection(connection) => {
                        self.update_connection(ctx, req, connection, event_metadata)
                    }
                    DeviceMetadataUpdate::ShadowSynchronization(shadow) => {
                        self.request_shadow_synchronization(ctx, req, shadow, event_metadata)
                    }
                }
            }
            DeviceMetadataCommand::Confirm(req) => {
                let event_metadata =
                    ctx.event_metadata(new_version, require_metadata(&req.command_metadata)?);
                let Some(pending) = self.find_pending(&req.correlation_id) else {
                    return Err(HubError::InvalidArgument(format!(
                        "cannot find shadow synchronization status update pending event with correlationId({})",
                        req.correlation_id
                    )));
                };
                let confirmed = pending.shadow_synchronization;
                let mut event =
                    self.updated(ctx, req.device_id, &req.correlation_id, event_metadata);
                if req.status.is_successful() {
                    event.shadow_synchronization = confirmed;
                }
                let event = HubEvent::from(event);
                self.handle_event(&event)?;
                Ok(vec![event])
            }
            DeviceMetadataCommand::CancelPending(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                let canceled: Vec<String> = self
                    .update_pendings
                    .iter()
                    .map(|p| p.audit_context.correlation_id.clone())
                    .filter(|id| {
                        req.correlation_id_filter.is_empty() || req.correlation_id_filter.contains(id)
                    })
                    .collect();
                if canceled.is_empty() {
                    return Err(HubError::InvalidArgument(format!(
                        "cannot find update pending events of device {}",
                        req.device_id
                    )));
                }
                let mut events = Vec::with_capacity(canceled.len());
                for (offset, correlation_id) in canceled.iter().enumerate() {
                    let event_metadata = ctx.event_metadata(new_version + offset as u64, metadata);
                    let mut event =
                        self.updated(ctx, req.device_id.clone(), correlation_id, event_metadata);
                    event.canceled = true;
                    let event = HubEvent::from(event);
                    self.handle_event(&event)?;
                    events.push(event);
                }
                Ok(events)
            }
        }
    }

    fn take_snapshot(&self, version: u64) -> Option<HubEvent> {
        let mut snapshot = self.clone();
        snapshot.event_metadata.version = version;
        Some(snapshot.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Status;
    use chrono::{DateTime, Duration, Utc};

    fn ctx() -> CommandContext {
        let now = DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        CommandContext::new("owner", "user", "hub", now)
    }

    fn update(update: DeviceMetadataUpdate, correlation_id: &str, sequence: u64) -> DeviceMetadataCommand {
        DeviceMetadataCommand::Update(UpdateDeviceMetadataRequest {
            device_id: "dev-1".into(),
            update,
            correlation_id: correlation_id.into(),
            time_to_live: Duration::zero(),
            command_metadata: Some(CommandMetadata::new("conn", sequence)),
        })
    }

    fn confirm(correlation_id: &str) -> DeviceMetadataCommand {
        DeviceMetadataCommand::Confirm(ConfirmDeviceMetadataUpdateRequest {
            device_id: "dev-1".into(),
            correlation_id: correlation_id.into(),
            status: Status::Ok,
            command_metadata: Some(CommandMetadata::new("conn", 10)),
        })
    }

    #[test]
    fn test_connection_status_is_immediate() {
        let mut state = DeviceMetadataSnapshotTaken::default();
        let events = state
            .handle_command(&ctx(), update(DeviceMetadataUpdate::Connection(Connection::online()), "", 1), 0)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "devicemetadataupdated");
        assert!(state.connection().is_online());
        assert!(state.update_pendings.is_empty());
    }

    #[test]
    fn test_identical_connection_status_is_noop() {
        let mut state = DeviceMetadataSnapshotTaken::default();
        let online = DeviceMetadataUpdate::Connection(Connection::online());
        state.handle_command(&ctx(), update(online.clone(), "", 1), 0).unwrap();
        let events = state.handle_command(&ctx(), update(online, "", 2), 1).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_shadow_synchronization_pending_then_confirm() {
        let mut state = DeviceMetadataSnapshotTaken::default();
        let shadow = DeviceMetadataUpdate::ShadowSynchronization(ShadowSynchronization::Disabled);
        let events = state.handle_command(&ctx(), update(shadow, "corr-1", 1), 0).unwrap();
        assert_eq!(events[0].event_type(), "devicemetadataupdatepending");
        assert_eq!(state.update_pendings.len(), 1);
        assert_eq!(state.shadow_synchronization(), ShadowSynchronization::Unset);

        state.handle_command(&ctx(), confirm("corr-1"), 1).unwrap();
        assert!(state.update_pendings.is_empty());
        assert_eq!(state.shadow_synchronization(), ShadowSynchronization::Disabled);
    }

    #[test]
    fn test_duplicate_pending_correlation_id() {
        let mut state = DeviceMetadataSnapshotTaken::default();
        let shadow = DeviceMetadataUpdate::ShadowSynchronization(ShadowSynchronization::Enabled);
        state.handle_command(&ctx(), update(shadow.clone(), "corr-1", 1), 0).unwrap();
        let err = state.handle_command(&ctx(), update(shadow, "corr-1", 2), 1).unwrap_err();
        assert!(matches!(err, HubError::InvalidArgument(_)));
        assert_eq!(state.update_pendings.len(), 1);
    }

    #[test]
    fn test_confirm_without_pending() {
        let mut state = DeviceMetadataSnapshotTaken::default();
        let err = state.handle_command(&ctx(), confirm("nope"), 0).unwrap_err();
        assert_eq!(
            err,
            HubError::InvalidArgument(
                "cannot find shadow synchronization status update pending event with correlationId(nope)"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_cancel_pending_updates() {
        let mut state = DeviceMetadataSnapshotTaken::default();
        for (i, corr) in ["a", "b"].iter().enumerate() {
            let shadow = DeviceMetadataUpdate::ShadowSynchronization(ShadowSynchronization::Enabled);
            state.handle_command(&ctx(), update(shadow, corr, i as u64), i as u64).unwrap();
        }
        let cancel = DeviceMetadataCommand::CancelPending(CancelPendingMetadataUpdatesRequest {
            device_id: "dev-1".into(),
            correlation_id_filter: vec![],
            correlation_id: String::new(),
            command_metadata: Some(CommandMetadata::default()),
        });
        let events = state.handle_command(&ctx(), cancel.clone(), 2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].version(), 3);
        assert!(matches!(&events[0], HubEvent::DeviceMetadataUpdated(e) if e.canceled));
        assert!(state.update_pendings.is_empty());

        assert!(matches!(
            state.handle_command(&ctx(), cancel, 4),
            Err(HubError::InvalidArgument(_))
        ));
    }
}

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource State Aggregate
//!
//! Authoritative state machine for the request lifecycle of one resource.
//!
//! # States
//!
//! ```text
//! Idle (pending_requests_count == 0)  ⇄  Pending (pending_requests_count > 0)
//! ```
//!
//! Only update requests move the counter. Retrieve, create and delete
//! requests are recorded as events but leave it untouched, so a snapshot is
//! gated on outstanding updates only.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::commands::*;
use crate::aggregate::AggregateModel;
use crate::errors::HubResult;
use crate::events::*;

/// Snapshot of one resource's aggregate; also the aggregate state itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStateSnapshotTaken {
    pub resource_id: ResourceId,
    /// Last device-reported state accepted by the aggregate
    #[serde(default)]
    pub latest_resource_change: Option<ResourceChanged>,
    #[serde(default)]
    pub pending_requests_count: i64,
    pub event_metadata: EventMetadata,
}

impl DomainEvent for ResourceStateSnapshotTaken {
    const EVENT_TYPE: &'static str = "resourcestatesnapshottaken";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        self.latest_resource_change.as_ref().map(|c| &c.audit_context)
    }

    fn aggregate_id(&self) -> Uuid {
        self.resource_id.to_uuid()
    }

    fn group_id(&self) -> &str {
        &self.resource_id.device_id
    }

    fn is_snapshot(&self) -> bool {
        true
    }

    fn check_initialized(&self) -> bool {
        self.resource_id.is_initialized() && self.event_metadata.timestamp != 0
    }
}

impl ResourceStateSnapshotTaken {
    /// Whether a device report carrying `incoming` should be accepted.
    ///
    /// Rejects reports from the connection of the latest change whose
    /// sequence number is not strictly greater.
    pub fn validate_sequence(&self, incoming: &EventMetadata) -> bool {
        match &self.latest_resource_change {
            None => true,
            Some(latest) => latest.event_metadata.is_superseded_by(incoming),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending_requests_count > 0
    }

    fn track(&mut self, resource_id: &ResourceId, metadata: &EventMetadata) {
        self.resource_id = resource_id.clone();
        self.event_metadata = metadata.clone();
    }

    fn apply(&mut self, event: HubEvent) -> HubResult<Vec<HubEvent>> {
        self.handle_event(&event)?;
        Ok(vec![event])
    }

    /// Content type the device last reported; empty before any report.
    fn latest_content_type(&self) -> String {
        self.latest_resource_change
            .as_ref()
            .map(|c| c.content.effective_content_type())
            .unwrap_or_default()
    }
}

impl AggregateModel for ResourceStateSnapshotTaken {
    type Command = ResourceStateCommand;

    fn handle_event(&mut self, event: &HubEvent) -> HubResult<()> {
        match event {
            HubEvent::ResourceChanged(e) => {
                self.track(&e.resource_id, &e.event_metadata);
                self.latest_resource_change = Some(e.clone());
            }
            HubEvent::ResourceUpdatePending(e) => {
                self.track(&e.resource_id, &e.event_metadata);
                self.pending_requests_count += 1;
            }
            HubEvent::ResourceUpdated(e) => {
                self.track(&e.resource_id, &e.event_metadata);
                self.pending_requests_count = (self.pending_requests_count - 1).max(0);
            }
            HubEvent::ResourceRetrievePending(e) => self.track(&e.resource_id, &e.event_metadata),
            HubEvent::ResourceRetrieved(e) => self.track(&e.resource_id, &e.event_metadata),
            HubEvent::ResourceDeletePending(e) => self.track(&e.resource_id, &e.event_metadata),
            HubEvent::ResourceDeleted(e) => self.track(&e.resource_id, &e.event_metadata),
            HubEvent::ResourceCreatePending(e) => self.track(&e.resource_id, &e.event_metadata),
            HubEvent::ResourceCreated(e) => self.track(&e.resource_id, &e.event_metadata),
            HubEvent::ResourceStateSnapshotTaken(e) => *self = e.clone(),
            _ => {}
        }
        Ok(())
    }

    fn handle_command(
        &mut self,
        ctx: &CommandContext,
        command: ResourceStateCommand,
        new_version: u64,
    ) -> HubResult<Vec<HubEvent>> {
        match command {
            ResourceStateCommand::NotifyResourceChanged(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                let event_metadata = ctx.event_metadata(new_version, metadata);
                if !self.validate_sequence(&event_metadata) {
                    return Ok(Vec::new());
                }
                self.apply(
                    ResourceChanged {
                        resource_id: req.resource_id,
                        content: req.content,
                        status: req.status,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata,
                    }
                    .into(),
                )
            }
            ResourceStateCommand::UpdateResource(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                let content = req.content.convert_to(&self.latest_content_type())?;
                self.apply(
                    ResourceUpdatePending {
                        resource_id: req.resource_id,
                        resource_interface: req.resource_interface,
                        content,
                        valid_until: ctx.valid_until(req.time_to_live)?,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::ConfirmResourceUpdate(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceUpdated {
                        resource_id: req.resource_id,
                        content: req.content,
                        status: req.status,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::RetrieveResource(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceRetrievePending {
                        resource_id: req.resource_id,
                        resource_interface: req.resource_interface,
                        valid_until: ctx.valid_until(req.time_to_live)?,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::ConfirmResourceRetrieve(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceRetrieved {
                        resource_id: req.resource_id,
                        content: req.content,
                        status: req.status,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::DeleteResource(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceDeletePending {
                        resource_id: req.resource_id,
                        valid_until: ctx.valid_until(req.time_to_live)?,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::ConfirmResourceDelete(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceDeleted {
                        resource_id: req.resource_id,
                        content: req.content,
                        status: req.status,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::CreateResource(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceCreatePending {
                        resource_id: req.resource_id,
                        content: req.content,
                        valid_until: ctx.valid_until(req.time_to_live)?,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceStateCommand::ConfirmResourceCreate(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                self.apply(
                    ResourceCreated {
                        resource_id: req.resource_id,
                        content: req.content,
                        status: req.status,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
        }
    }

    /// `None` while an update is outstanding.
    fn take_snapshot(&self, version: u64) -> Option<HubEvent> {
        if self.is_pending() {
            return None;
        }
        let mut snapshot = self.clone();
        snapshot.event_metadata.version = version;
        Some(snapshot.into())
    }
}

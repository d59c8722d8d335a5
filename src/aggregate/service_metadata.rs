// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Metadata Aggregate
//!
//! One instance per hub. Tracks which service instances are alive as two
//! disjoint sets keyed by service id:
//!
//! ```text
//! heartbeat ──▶ valid ──(valid_until passed)──▶ expired ──(confirm)──▶ gone
//! ```
//!
//! A service in `expired` must be confirmed away before it can heartbeat
//! again; the cluster uses the confirmation to acknowledge it has fenced
//! the instance.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::commands::*;
use crate::aggregate::AggregateModel;
use crate::errors::{HubError, HubResult};
use crate::events::metadata::unix_nanos;
use crate::events::service_metadata::{service_metadata_aggregate_id, SERVICES_GROUP_ID};
use crate::events::*;

/// Upper bound, in seconds, of the processing delay credited to a heartbeat
pub const MAX_PROCESSING_DELAY_SECS: i64 = 120;
/// Multiplier applied to the processing delay credited to a heartbeat
pub const PROCESSING_DELAY_FACTOR: i32 = 10;

/// Outcome of folding a `ServiceMetadataUpdated` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataUpdate {
    Applied,
    /// The event carried exactly the current state.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadataSnapshotTaken {
    #[serde(default)]
    pub services_heartbeat: ServicesHeartbeat,
    pub event_metadata: EventMetadata,
}

impl DomainEvent for ServiceMetadataSnapshotTaken {
    const EVENT_TYPE: &'static str = "servicemetadatasnapshottaken";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        None
    }

    fn aggregate_id(&self) -> Uuid {
        service_metadata_aggregate_id(&self.event_metadata.hub_id)
    }

    fn group_id(&self) -> &str {
        SERVICES_GROUP_ID
    }

    fn is_snapshot(&self) -> bool {
        true
    }

    fn check_initialized(&self) -> bool {
        !self.event_metadata.hub_id.is_empty() && self.event_metadata.timestamp != 0
    }
}

/// Deadline of a heartbeat received at `ctx.now`.
///
/// A heartbeat whose own timestamp lies in the past is credited ten times
/// the delay it spent in transit, capped at two minutes of delay.
pub fn heartbeat_valid_until(
    ctx: &CommandContext,
    req: &ServiceHeartbeatRequest,
) -> HubResult<i64> {
    let mut valid_until = deadline(ctx.now, req.time_to_live)?;
    if req.timestamp < ctx.now {
        let delay = (ctx.now - req.timestamp).min(Duration::seconds(MAX_PROCESSING_DELAY_SECS));
        valid_until = deadline(valid_until, delay * PROCESSING_DELAY_FACTOR)?;
    }
    Ok(unix_nanos(valid_until))
}

impl ServiceMetadataSnapshotTaken {
    /// Folds an update, reporting whether it changed anything.
    pub fn handle_service_metadata_updated(&mut self, event: &ServiceMetadataUpdated) -> MetadataUpdate {
        if self.services_heartbeat == event.services_heartbeat {
            return MetadataUpdate::Unchanged;
        }
        self.services_heartbeat = event.services_heartbeat.clone();
        self.event_metadata = event.event_metadata.clone();
        MetadataUpdate::Applied
    }

    fn heartbeat(
        &self,
        ctx: &CommandContext,
        req: &ServiceHeartbeatRequest,
    ) -> HubResult<ServicesHeartbeat> {
        if req.service_id.is_empty() {
            return Err(HubError::InvalidArgument("service id is required".to_string()));
        }
        if req.time_to_live <= Duration::zero() {
            return Err(HubError::InvalidArgument(format!(
                "invalid time to live of service {}",
                req.service_id
            )));
        }
        if self.services_heartbeat.find_expired(&req.service_id).is_some() {
            return Err(HubError::FailedPrecondition(format!(
                "service {} has expired and must be confirmed before it can heartbeat",
                req.service_id
            )));
        }

        let now = ctx.now_nanos();
        let mut heartbeat = self.services_heartbeat.clone();
        let renewed = ServiceHeartbeat {
            service_id: req.service_id.clone(),
            time_to_live: req.time_to_live.num_nanoseconds().unwrap_or(i64::MAX),
            heartbeat_valid_until: heartbeat_valid_until(ctx, req)?,
        };
        match heartbeat.valid.iter_mut().find(|s| s.service_id == req.service_id) {
            Some(existing) => *existing = renewed,
            None => heartbeat.valid.push(renewed),
        }

        let (valid, stale): (Vec<_>, Vec<_>) = heartbeat
            .valid
            .into_iter()
            .partition(|s| s.heartbeat_valid_until > now);
        heartbeat.valid = valid;
        heartbeat.expired.extend(stale);
        Ok(heartbeat)
    }

    fn emit_update(
        &mut self,
        ctx: &CommandContext,
        services_heartbeat: ServicesHeartbeat,
        version: u64,
    ) -> Option<HubEvent> {
        let event = ServiceMetadataUpdated {
            services_heartbeat,
            audit_context: ctx.audit_context(""),
            event_metadata: ctx.event_metadata(version, &CommandMetadata::default()),
        };
        match self.handle_service_metadata_updated(&event) {
            MetadataUpdate::Applied => Some(event.into()),
            MetadataUpdate::Unchanged => None,
        }
    }
}

impl AggregateModel for ServiceMetadataSnapshotTaken {
    type Command = ServiceMetadataCommand;

    fn handle_event(&mut self, event: &HubEvent) -> HubResult<()> {
        match event {
            HubEvent::ServiceMetadataUpdated(e) => {
                self.handle_service_metadata_updated(e);
            }
            HubEvent::ServiceMetadataSnapshotTaken(e) => *self = e.clone(),
            _ => {}
        }
        Ok(())
    }

    fn handle_command(
        &mut self,
        ctx: &CommandContext,
        command: ServiceMetadataCommand,
        new_version: u64,
    ) -> HubResult<Vec<HubEvent>> {
        match command {
            ServiceMetadataCommand::Heartbeat(req) => {
                let heartbeat = self.heartbeat(ctx, &req)?;
                Ok(self.emit_update(ctx, heartbeat, new_version).into_iter().collect())
            }
            ServiceMetadataCommand::ConfirmExpiredServices(req) => {
                let mut heartbeat = self.services_heartbeat.clone();
                heartbeat
                    .expired
                    .retain(|s| !req.service_ids.contains(&s.service_id));
                if heartbeat.expired.len() == self.services_heartbeat.expired.len() {
                    return Ok(Vec::new());
                }
                let mut events: Vec<HubEvent> =
                    self.emit_update(ctx, heartbeat, new_version).into_iter().collect();
                events.extend(self.take_snapshot(new_version + 1));
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

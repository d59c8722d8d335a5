// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Links Aggregate
//!
//! Directory of the resources one device has published, keyed by href.
//! Publishing upserts, unpublishing removes. There is no in-flight request
//! concept here, so a snapshot can always be taken.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::commands::*;
use crate::aggregate::AggregateModel;
use crate::errors::{HubError, HubResult};
use crate::events::resource::normalize_href;
use crate::events::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLinksSnapshotTaken {
    pub device_id: String,
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
    pub event_metadata: EventMetadata,
}

impl DomainEvent for ResourceLinksSnapshotTaken {
    const EVENT_TYPE: &'static str = "resourcelinkssnapshottaken";

    fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    fn audit_context(&self) -> Option<&AuditContext> {
        None
    }

    fn aggregate_id(&self) -> Uuid {
        ResourceId::links(self.device_id.clone()).to_uuid()
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

impl ResourceLinksSnapshotTaken {
    /// Hrefs an unpublish request actually removes.
    ///
    /// An empty request selects every published link; otherwise only the
    /// requested hrefs that are currently published are returned.
    pub fn hrefs_to_unpublish(&self, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            return self.resources.keys().cloned().collect();
        }
        let mut hrefs: Vec<String> = Vec::new();
        for href in requested.iter().map(|h| normalize_href(h)) {
            if self.resources.contains_key(&href) && !hrefs.contains(&href) {
                hrefs.push(href);
            }
        }
        hrefs
    }

    /// Links that are still valid at `now_nanos`.
    pub fn live_resources(&self, now_nanos: i64) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| !r.is_expired(now_nanos))
    }

    fn apply(&mut self, event: HubEvent) -> HubResult<Vec<HubEvent>> {
        self.handle_event(&event)?;
        Ok(vec![event])
    }
}

impl AggregateModel for ResourceLinksSnapshotTaken {
    type Command = ResourceLinksCommand;

    fn handle_event(&mut self, event: &HubEvent) -> HubResult<()> {
        match event {
            HubEvent::ResourceLinksPublished(e) => {
                self.device_id = e.device_id.clone();
                self.event_metadata = e.event_metadata.clone();
                for resource in &e.resources {
                    self.resources.insert(resource.href.clone(), resource.clone());
                }
            }
            HubEvent::ResourceLinksUnpublished(e) => {
                self.device_id = e.device_id.clone();
                self.event_metadata = e.event_metadata.clone();
                if e.hrefs.is_empty() {
                    self.resources.clear();
                }
                for href in &e.hrefs {
                    self.resources.remove(href);
                }
            }
            HubEvent::ResourceLinksSnapshotTaken(e) => *self = e.clone(),
            _ => {}
        }
        Ok(())
    }

    fn handle_command(
        &mut self,
        ctx: &CommandContext,
        command: ResourceLinksCommand,
        new_version: u64,
    ) -> HubResult<Vec<HubEvent>> {
        match command {
            ResourceLinksCommand::Publish(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                if req.device_id.is_empty() {
                    return Err(HubError::InvalidArgument("device id is required".to_string()));
                }
                let resources = req
                    .resources
                    .into_iter()
                    .map(|mut resource| {
                        resource.href = normalize_href(&resource.href);
                        if resource.device_id.is_empty() {
                            resource.device_id = req.device_id.clone();
                        }
                        resource
                    })
                    .collect::<Vec<_>>();
                if let Some(foreign) = resources.iter().find(|r| r.device_id != req.device_id) {
                    return Err(HubError::InvalidArgument(format!(
                        "resource {} belongs to device {}, not {}",
                        foreign.href, foreign.device_id, req.device_id
                    )));
                }
                self.apply(
                    ResourceLinksPublished {
                        device_id: req.device_id,
                        resources,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
            ResourceLinksCommand::Unpublish(req) => {
                let metadata = require_metadata(&req.command_metadata)?;
                let hrefs = self.hrefs_to_unpublish(&req.hrefs);
                if hrefs.is_empty() {
                    return Ok(Vec::new());
                }
                self.apply(
                    ResourceLinksUnpublished {
                        device_id: req.device_id,
                        hrefs,
                        audit_context: ctx.audit_context(&req.correlation_id),
                        event_metadata: ctx.event_metadata(new_version, metadata),
                    }
                    .into(),
                )
            }
        }
    }

    fn take_snapshot(&self, version: u64) -> Option<HubEvent> {
        let mut snapshot = self.clone();
        snapshot.event_metadata.version = version;
        Some(snapshot.into())
    }
}

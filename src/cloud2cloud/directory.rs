// Copyright (c) 2025 - Cowboy AI, Inc.
//! Read access to device state used for initial subscription payloads

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::HubResult;
use crate::events::{Connection, Resource, ResourceChanged, ResourceId};

/// Device known to the directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(default)]
    pub connection: Connection,
}

impl DeviceRecord {
    pub fn is_online(&self) -> bool {
        self.connection.is_online()
    }
}

/// Device, link and content queries scoped to an owner
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn get_devices(&self, owner: &str, access_token: &str) -> HubResult<Vec<DeviceRecord>>;

    async fn get_resource_links(
        &self,
        owner: &str,
        access_token: &str,
        device_id: &str,
    ) -> HubResult<Vec<Resource>>;

    /// Latest reported content; `None` when the device never reported it.
    async fn retrieve_resource(
        &self,
        owner: &str,
        access_token: &str,
        resource_id: &ResourceId,
    ) -> HubResult<Option<ResourceChanged>>;
}

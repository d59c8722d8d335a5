// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource identity and published resource links

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Pseudo href identifying a device's resource-links aggregate
pub const RESOURCE_LINKS_HREF: &str = "/plgd/res";
/// Pseudo href identifying a device's metadata aggregate
pub const DEVICE_METADATA_HREF: &str = "/plgd/dev";

/// Identity of a single resource on a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub device_id: String,
    pub href: String,
}

impl ResourceId {
    pub fn new(device_id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            href: normalize_href(&href.into()),
        }
    }

    /// Stable aggregate identity derived from device id and href.
    pub fn to_uuid(&self) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{}{}", self.device_id, self.href).as_bytes(),
        )
    }

    pub fn links(device_id: impl Into<String>) -> Self {
        Self::new(device_id, RESOURCE_LINKS_HREF)
    }

    pub fn device_metadata(device_id: impl Into<String>) -> Self {
        Self::new(device_id, DEVICE_METADATA_HREF)
    }

    pub fn is_initialized(&self) -> bool {
        !self.device_id.is_empty() && !self.href.is_empty()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.device_id, self.href)
    }
}

/// Hrefs always start with a single slash.
pub fn normalize_href(href: &str) -> String {
    format!("/{}", href.trim_start_matches('/'))
}

/// OCF policy bit mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    #[serde(rename = "bm")]
    pub bit_flags: i32,
}

impl Policy {
    pub const DISCOVERABLE: i32 = 1;
    pub const OBSERVABLE: i32 = 2;
    pub const SECURE: i32 = 8;

    pub fn is_discoverable(&self) -> bool {
        self.bit_flags & Self::DISCOVERABLE != 0
    }

    pub fn is_observable(&self) -> bool {
        self.bit_flags & Self::OBSERVABLE != 0
    }

    pub fn is_secure(&self) -> bool {
        self.bit_flags & Self::SECURE != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointInformation {
    #[serde(rename = "ep")]
    pub endpoint: String,
    #[serde(rename = "pri", default)]
    pub priority: u64,
}

/// Resource link declared by a device, in OCF link format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub href: String,
    #[serde(rename = "di")]
    pub device_id: String,
    #[serde(rename = "rt", default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<String>,
    #[serde(rename = "if", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub anchor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub supported_content_types: Vec<String>,
    /// Unix nanoseconds; 0 means the link never expires.
    #[serde(rename = "validUntil", default, skip_serializing_if = "is_zero")]
    pub valid_until: i64,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(rename = "eps", default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint_informations: Vec<EndpointInformation>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Resource {
    pub fn new(device_id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            href: normalize_href(&href.into()),
            device_id: device_id.into(),
            ..Default::default()
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.device_id.clone(), self.href.clone())
    }

    pub fn is_expired(&self, now_nanos: i64) -> bool {
        self.valid_until != 0 && self.valid_until <= now_nanos
    }
}

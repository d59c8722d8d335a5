// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud-to-cloud subscription records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{HubError, HubResult};
use crate::events::{normalize_href, ResourceId};

/// Scope of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    /// Every device of the owner
    Devices,
    /// Resource links of one device
    Device,
    /// Content of one resource
    Resource,
}

/// Webhook event types, with their wire names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "resource_contentchanged")]
    ResourceChanged,
    #[serde(rename = "resources_published")]
    ResourcesPublished,
    #[serde(rename = "resources_unpublished")]
    ResourcesUnpublished,
    #[serde(rename = "devices_online")]
    DevicesOnline,
    #[serde(rename = "devices_offline")]
    DevicesOffline,
    #[serde(rename = "devices_registered")]
    DevicesRegistered,
    #[serde(rename = "devices_unregistered")]
    DevicesUnregistered,
    #[serde(rename = "subscription_canceled")]
    SubscriptionCanceled,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::ResourceChanged,
        EventType::ResourcesPublished,
        EventType::ResourcesUnpublished,
        EventType::DevicesOnline,
        EventType::DevicesOffline,
        EventType::DevicesRegistered,
        EventType::DevicesUnregistered,
        EventType::SubscriptionCanceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ResourceChanged => "resource_contentchanged",
            EventType::ResourcesPublished => "resources_published",
            EventType::ResourcesUnpublished => "resources_unpublished",
            EventType::DevicesOnline => "devices_online",
            EventType::DevicesOffline => "devices_offline",
            EventType::DevicesRegistered => "devices_registered",
            EventType::DevicesUnregistered => "devices_unregistered",
            EventType::SubscriptionCanceled => "subscription_canceled",
        }
    }

    /// Event types a subscriber may request for a subscription type.
    ///
    /// `subscription_canceled` is always delivered and never requested.
    pub fn supported_by(subscription_type: SubscriptionType) -> &'static [EventType] {
        match subscription_type {
            SubscriptionType::Devices => &[
                EventType::DevicesOnline,
                EventType::DevicesOffline,
                EventType::DevicesRegistered,
                EventType::DevicesUnregistered,
            ],
            SubscriptionType::Device => {
                &[EventType::ResourcesPublished, EventType::ResourcesUnpublished]
            }
            SubscriptionType::Resource => &[EventType::ResourceChanged],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| HubError::InvalidArgument(format!("unsupported event type '{s}'")))
    }
}

/// Persisted subscription of an external cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    /// Webhook receiving the notifications
    pub url: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(rename = "type")]
    pub subscription_type: SubscriptionType,
    /// Accepted payload encodings, in preference order
    #[serde(default)]
    pub accept: Vec<String>,
    /// Encoding the subscriber accepts in responses, forwarded as given
    #[serde(default)]
    pub accept_encoding: String,
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub href: String,
    /// Sequence number of the next notification
    #[serde(default)]
    pub sequence_number: u64,
    pub signing_secret: String,
    #[serde(default)]
    pub access_token: String,
    pub owner: String,
    /// Whether the initial state has been delivered
    #[serde(default)]
    pub initialized: bool,
}

impl Subscription {
    /// New uninitialized subscription with a random id.
    pub fn new(
        subscription_type: SubscriptionType,
        url: impl Into<String>,
        event_types: Vec<EventType>,
        signing_secret: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            correlation_id: String::new(),
            subscription_type,
            accept: Vec::new(),
            accept_encoding: String::new(),
            event_types,
            device_id: String::new(),
            href: String::new(),
            sequence_number: 0,
            signing_secret: signing_secret.into(),
            access_token: String::new(),
            owner: owner.into(),
            initialized: false,
        }
    }

    pub fn for_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn for_resource(mut self, device_id: impl Into<String>, href: &str) -> Self {
        self.device_id = device_id.into();
        self.href = normalize_href(href);
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_accept(mut self, accept: Vec<String>) -> Self {
        self.accept = accept;
        self
    }

    pub fn with_accept_encoding(mut self, accept_encoding: impl Into<String>) -> Self {
        self.accept_encoding = accept_encoding.into();
        self
    }

    /// Resource watched by a resource subscription.
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self.subscription_type {
            SubscriptionType::Resource => Some(ResourceId::new(&self.device_id, &self.href)),
            _ => None,
        }
    }

    pub fn wants(&self, event_type: EventType) -> bool {
        event_type == EventType::SubscriptionCanceled || self.event_types.contains(&event_type)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.id.is_empty() {
            return Err(HubError::InvalidArgument("invalid id".into()));
        }
        if self.owner.is_empty() {
            return Err(HubError::InvalidArgument("invalid owner".into()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(HubError::InvalidArgument(format!(
                "invalid eventsUrl '{}'",
                self.url
            )));
        }
        if self.signing_secret.is_empty() {
            return Err(HubError::InvalidArgument("invalid signingSecret".into()));
        }
        if self.event_types.is_empty() {
            return Err(HubError::InvalidArgument("invalid eventTypes".into()));
        }
        let supported = EventType::supported_by(self.subscription_type);
        if let Some(unsupported) = self.event_types.iter().find(|t| !supported.contains(t)) {
            return Err(HubError::InvalidArgument(format!(
                "eventType '{unsupported}' is not supported by {:?} subscriptions",
                self.subscription_type
            )));
        }
        match self.subscription_type {
            SubscriptionType::Devices => {
                if !self.device_id.is_empty() {
                    return Err(HubError::InvalidArgument("unexpected deviceId".into()));
                }
                if !self.href.is_empty() {
                    return Err(HubError::InvalidArgument("unexpected href".into()));
                }
            }
            SubscriptionType::Device => {
                if self.device_id.is_empty() {
                    return Err(HubError::InvalidArgument("invalid deviceId".into()));
                }
                if !self.href.is_empty() {
                    return Err(HubError::InvalidArgument("unexpected href".into()));
                }
            }
            SubscriptionType::Resource => {
                if self.device_id.is_empty() {
                    return Err(HubError::InvalidArgument("invalid deviceId".into()));
                }
                if self.href.is_empty() {
                    return Err(HubError::InvalidArgument("invalid href".into()));
                }
            }
        }
        Ok(())
    }
}

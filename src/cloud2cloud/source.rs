// Copyright (c) 2025 - Cowboy AI, Inc.
//! Live event sources feeding subscriptions
//!
//! An [`EventSource`] streams the hub events of one subscription scope to a
//! [`SourceHandler`]. [`NatsEventSource`] follows the owner scoped subjects
//! of the event bus:
//!
//! ```text
//! devices   hub.owners.{owner}.devices.*.devicemetadataupdated
//!           hub.owners.{owner}.registrations
//! device    hub.owners.{owner}.devices.{device}.resourcelinkspublished
//!           hub.owners.{owner}.devices.{device}.resourcelinksunpublished
//! resource  hub.owners.{owner}.devices.{device}.resources.{uuid}.resourcechanged
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::auth::AccessTokenValidator;
use super::subscription::{Subscription, SubscriptionType};
use crate::errors::{HubError, HubResult};
use crate::events::{
    DeviceMetadataUpdated, DomainEvent, EventEnvelope, HubEvent, ResourceChanged, ResourceId,
    ResourceLinksPublished, ResourceLinksUnpublished,
};
use crate::nats::NatsClient;
use crate::subjects::{registrations, SubjectBuilder};

/// Registration changes announced by the authorization service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistrationEvent {
    #[serde(rename_all = "camelCase")]
    DevicesRegistered { owner: String, device_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    DevicesUnregistered { owner: String, device_ids: Vec<String> },
}

impl RegistrationEvent {
    pub fn owner(&self) -> &str {
        match self {
            RegistrationEvent::DevicesRegistered { owner, .. }
            | RegistrationEvent::DevicesUnregistered { owner, .. } => owner,
        }
    }

    /// Announces the change on the owner's registrations subject.
    pub async fn announce(&self, client: &NatsClient) -> HubResult<()> {
        client.publish(&registrations(self.owner()), self).await
    }
}

/// Events delivered to a subscription handler
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    ResourceChanged(ResourceChanged),
    ResourceLinksPublished(ResourceLinksPublished),
    ResourceLinksUnpublished(ResourceLinksUnpublished),
    DeviceMetadataUpdated(DeviceMetadataUpdated),
    Registration(RegistrationEvent),
}

impl SourceEvent {
    /// Hub events relevant to subscriptions; everything else is `None`.
    pub fn from_hub_event(event: HubEvent) -> Option<Self> {
        match event {
            HubEvent::ResourceChanged(e) => Some(SourceEvent::ResourceChanged(e)),
            HubEvent::ResourceLinksPublished(e) => Some(SourceEvent::ResourceLinksPublished(e)),
            HubEvent::ResourceLinksUnpublished(e) => {
                Some(SourceEvent::ResourceLinksUnpublished(e))
            }
            HubEvent::DeviceMetadataUpdated(e) => Some(SourceEvent::DeviceMetadataUpdated(e)),
            _ => None,
        }
    }
}

/// Scope of a live subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceScope {
    pub owner: String,
    pub access_token: String,
    pub subscription_type: SubscriptionType,
    pub device_id: String,
    pub href: String,
}

impl From<&Subscription> for SourceScope {
    fn from(sub: &Subscription) -> Self {
        Self {
            owner: sub.owner.clone(),
            access_token: sub.access_token.clone(),
            subscription_type: sub.subscription_type,
            device_id: sub.device_id.clone(),
            href: sub.href.clone(),
        }
    }
}

impl SourceScope {
    /// Bus subjects carrying the events of this scope.
    pub fn subjects(&self) -> Vec<String> {
        match self.subscription_type {
            SubscriptionType::Devices => vec![
                SubjectBuilder::new(&self.owner)
                    .event_type(DeviceMetadataUpdated::EVENT_TYPE)
                    .build(),
                registrations(&self.owner),
            ],
            SubscriptionType::Device => [
                ResourceLinksPublished::EVENT_TYPE,
                ResourceLinksUnpublished::EVENT_TYPE,
            ]
            .into_iter()
            .map(|event_type| {
                SubjectBuilder::new(&self.owner)
                    .device(&self.device_id)
                    .event_type(event_type)
                    .build()
            })
            .collect(),
            SubscriptionType::Resource => vec![SubjectBuilder::new(&self.owner)
                .device(&self.device_id)
                .resource(ResourceId::new(&self.device_id, &self.href).to_uuid())
                .event_type(ResourceChanged::EVENT_TYPE)
                .build()],
        }
    }
}

/// Callbacks of a live subscription
#[async_trait]
pub trait SourceHandler: Send + Sync {
    async fn handle(&self, event: SourceEvent) -> HubResult<()>;

    /// The stream ended; the subscription may be reconnected.
    fn on_close(&self);

    /// The stream failed.
    fn on_error(&self, err: HubError);
}

/// Handle of a running subscription; canceling stops event delivery.
#[derive(Debug, Clone)]
pub struct LiveSubscription {
    token: CancellationToken,
}

impl LiveSubscription {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Streaming subscribe with typed callbacks
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(
        &self,
        scope: &SourceScope,
        handler: Arc<dyn SourceHandler>,
    ) -> HubResult<LiveSubscription>;
}

/// Event source following the hub event bus
pub struct NatsEventSource {
    client: NatsClient,
    validator: Option<Arc<dyn AccessTokenValidator>>,
}

impl NatsEventSource {
    pub fn new(client: NatsClient) -> Self {
        Self {
            client,
            validator: None,
        }
    }

    /// Rejects scopes whose access token does not belong to the owner.
    pub fn with_validator(mut self, validator: Arc<dyn AccessTokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Decodes a bus message into a source event.
pub fn decode_message(subject: &str, payload: &[u8]) -> HubResult<Option<SourceEvent>> {
    if subject.ends_with(".registrations") {
        let event: RegistrationEvent = serde_json::from_slice(payload)?;
        return Ok(Some(SourceEvent::Registration(event)));
    }
    let envelope: EventEnvelope = serde_json::from_slice(payload)?;
    Ok(envelope.decode()?.and_then(SourceEvent::from_hub_event))
}

#[async_trait]
impl EventSource for NatsEventSource {
    async fn subscribe(
        &self,
        scope: &SourceScope,
        handler: Arc<dyn SourceHandler>,
    ) -> HubResult<LiveSubscription> {
        if let Some(validator) = &self.validator {
            let owner = validator.validate(&scope.access_token)?;
            if owner != scope.owner {
                return Err(HubError::PermissionDenied(format!(
                    "access token does not belong to owner {}",
                    scope.owner
                )));
            }
        }

        let mut subscribers = Vec::new();
        for subject in scope.subjects() {
            subscribers.push(self.client.subscribe(&subject).await?);
        }
        let mut messages = stream::select_all(subscribers);

        let token = CancellationToken::new();
        let cancel = token.clone();
        let owner = scope.owner.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = messages.next() => message,
                };
                let Some(message) = message else {
                    debug!(owner = %owner, "event bus subscription ended");
                    break;
                };
                let event = match decode_message(message.subject.as_str(), &message.payload) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(subject = %message.subject, error = %e, "skipping undecodable event");
                        continue;
                    }
                };
                if let Err(e) = handler.handle(event).await {
                    handler.on_error(e);
                    return;
                }
            }
            handler.on_close();
        });

        Ok(LiveSubscription::new(token))
    }
}

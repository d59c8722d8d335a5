// Copyright (c) 2025 - Cowboy AI, Inc.
//! Hub event bus over core NATS
//!
//! Saved aggregate events are broadcast as JSON [`EventEnvelope`]s on the
//! owner scoped subjects built in [`crate::subjects`]. Core NATS gives the
//! bus at-most-once delivery; anything that must survive a restart is read
//! back from the event store instead.

use async_nats::{Client, ConnectOptions, Subscriber};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{HubError, HubResult};
use crate::events::{EventEnvelope, HubEvent};
use crate::subjects::event_subject;

/// Connection settings of the hub bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    /// Client name reported to the server, also the prefix of service ids
    pub name: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "c2c-gateway".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared connection to the hub bus
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    pub async fn new(config: &NatsConfig) -> HubResult<Self> {
        let options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| HubError::Unavailable(format!("cannot connect to NATS: {e}")))?;

        info!(servers = ?config.servers, name = %config.name, "connected to NATS");
        Ok(Self { client })
    }

    /// Serializes `message` as JSON and publishes it on `subject`.
    pub async fn publish<T: Serialize>(&self, subject: &str, message: &T) -> HubResult<()> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| HubError::Nats(format!("publish {subject}: {e}")))?;
        debug!(subject, "published");
        Ok(())
    }

    pub async fn subscribe(&self, subject: &str) -> HubResult<Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| HubError::Nats(format!("subscribe {subject}: {e}")))?;
        debug!(subject, "subscribed");
        Ok(subscriber)
    }

    /// Raw client, used to open JetStream contexts.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Broadcasts saved events to live subscribers
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &HubEvent) -> HubResult<()>;
}

/// Publishes event envelopes on their owner scoped subjects
#[derive(Clone)]
pub struct NatsEventPublisher {
    client: NatsClient,
}

impl NatsEventPublisher {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &HubEvent) -> HubResult<()> {
        let envelope = EventEnvelope::encode(event)?;
        self.client.publish(&event_subject(event), &envelope).await
    }
}

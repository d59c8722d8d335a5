// Copyright (c) 2025 - Cowboy AI, Inc.
//! OCF cloud hub core
//!
//! Event-sourced resource and device aggregates, the NATS event bus and
//! event store they persist to, and the cloud-to-cloud gateway that
//! re-exposes device state to external clouds through signed webhooks.
//!
//! # Modules
//!
//! - [`aggregate`]: command handling and snapshotting of the four aggregates
//! - [`events`]: domain events and their stored envelope
//! - [`event_store`]: append-only storage with optimistic concurrency
//! - [`content`]: content-format conversion and status mapping
//! - [`cloud2cloud`]: subscriptions, webhook delivery and the HTTP API
//! - [`projection`]: device directory read model

pub mod aggregate;
pub mod cloud2cloud;
pub mod config;
pub mod content;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod jetstream;
pub mod nats;
pub mod projection;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use aggregate::{Aggregate, AggregateModel, CommandContext};
pub use config::GatewayConfig;
pub use errors::{HubError, HubResult};
pub use event_store::{EventStore, InMemoryEventStore, NatsEventStore};
pub use events::{EventEnvelope, EventMetadata, HubEvent};
pub use nats::{EventPublisher, NatsClient, NatsConfig, NatsEventPublisher};
pub use projection::DirectoryProjection;

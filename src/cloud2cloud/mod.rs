// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud-to-Cloud Gateway
//!
//! Re-exposes device state to external clouds through signed webhooks.
//!
//! # Flow
//!
//! ```text
//! HTTP subscribe ──▶ SubscriptionManager::store ──▶ SubscriptionStore
//!                          │
//!                          ▼ connect
//! EventSource ──SourceEvent──▶ SubscriptionHandler ──▶ EventEmitter ──POST──▶ webhook
//!                                   │                        │
//!                                   └── sequence number ◀────┘ SubscriptionStore
//! ```
//!
//! Every notification carries a per-subscription sequence number and an
//! HMAC-SHA256 signature. A `410 Gone` response or a fatal stream error
//! removes the subscription and sends `subscription_canceled`.

pub mod auth;
pub mod directory;
pub mod emit;
pub mod handler;
pub mod http;
pub mod manager;
pub mod signature;
pub mod source;
pub mod store;
pub mod subscription;

pub use auth::{AccessTokenValidator, AuthRules, StaticTokenValidator};
pub use directory::{DeviceDirectory, DeviceRecord};
pub use emit::{EmitOutcome, EventEmitter};
pub use handler::{SubscriptionHandler, Teardown};
pub use manager::{SubscriptionData, SubscriptionManager, DEFAULT_RECONNECT_INTERVAL};
pub use source::{
    EventSource, LiveSubscription, NatsEventSource, RegistrationEvent, SourceEvent,
    SourceHandler, SourceScope,
};
pub use store::{
    InMemorySubscriptionStore, NatsSubscriptionStore, SubscriptionQuery, SubscriptionStore,
};
pub use subscription::{EventType, Subscription, SubscriptionType};

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud-to-Cloud Gateway Service
//!
//! Serves the subscription API and delivers signed webhook notifications for
//! events flowing on the hub event bus.
//!
//! - Subscriptions → JetStream KV bucket
//! - Device directory ← event store replay + live event bus
//! - Service heartbeat → service metadata aggregate
//!
//! Run with: cargo run --bin c2c-gateway
//!
//! Prerequisites:
//! 1. NATS server with JetStream running (default: localhost:4222)
//! 2. Access tokens configured via C2C_ACCESS_TOKENS (token=owner,...)

use anyhow::{Context, Result};
use chrono::Utc;
use ocf_cloud_hub::{
    aggregate::{
        Aggregate, CommandContext, ConfirmExpiredServicesRequest, ServiceHeartbeatRequest,
        ServiceMetadataCommand, ServiceMetadataSnapshotTaken,
    },
    cloud2cloud::{
        http::router, AuthRules, EventEmitter, NatsEventSource, NatsSubscriptionStore,
        StaticTokenValidator, SubscriptionManager,
    },
    events::service_metadata::{service_metadata_aggregate_id, SERVICES_GROUP_ID},
    jetstream::JetStreamConfig,
    DirectoryProjection, EventStore, GatewayConfig, HubError, NatsClient, NatsEventPublisher,
    NatsEventStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_TTL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting cloud-to-cloud gateway");

    let config = GatewayConfig::from_env().context("Invalid configuration")?;
    info!(
        listen = %config.listen_addr,
        nats = ?config.nats.servers,
        bucket = %config.subscriptions_bucket,
        hub_id = %config.hub_id,
        "configuration loaded"
    );

    let client = NatsClient::new(&config.nats)
        .await
        .context("Failed to connect to NATS")?;
    let jetstream = async_nats::jetstream::new(client.inner().clone());

    let event_store = Arc::new(
        NatsEventStore::with_client(client.inner().clone(), JetStreamConfig::default())
            .await
            .context("Failed to open event store")?,
    );

    let token = CancellationToken::new();

    // Device directory: replay, then follow the bus
    let directory = Arc::new(DirectoryProjection::new());
    let history = event_store
        .load_everything()
        .await
        .context("Failed to load stored events")?;
    let applied = directory.hydrate(&history)?;
    info!(applied, "device directory hydrated");
    {
        let directory = directory.clone();
        let client = client.clone();
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = directory.follow(&client, token).await {
                error!(error = %e, "device directory stopped");
            }
        });
    }

    let store = Arc::new(
        NatsSubscriptionStore::new(&jetstream, &config.subscriptions_bucket)
            .await
            .context("Failed to open subscription bucket")?,
    );
    let validator = Arc::new(StaticTokenValidator::new(config.access_tokens.clone()));
    let source = Arc::new(NatsEventSource::new(client.clone()).with_validator(validator.clone()));
    let emitter = EventEmitter::new(config.emit_timeout)?;

    let manager = SubscriptionManager::new(
        store,
        source,
        directory,
        emitter,
        config.reconnect_interval,
    );
    manager.load_subscriptions().await?;
    let manager_task = {
        let manager = manager.clone();
        let token = token.clone();
        tokio::spawn(async move { manager.run(token).await })
    };

    let heartbeat_task = {
        let aggregate = Aggregate::<ServiceMetadataSnapshotTaken>::new(
            SERVICES_GROUP_ID,
            service_metadata_aggregate_id(&config.hub_id),
            event_store.clone() as Arc<dyn EventStore>,
        )
        .with_publisher(Arc::new(NatsEventPublisher::new(client.clone())));
        let service_id = format!("{}-{}", config.nats.name, Uuid::new_v4());
        let hub_id = config.hub_id.clone();
        let token = token.clone();
        tokio::spawn(async move { heartbeat(aggregate, service_id, hub_id, token).await })
    };

    let app = router(
        manager,
        validator,
        AuthRules::new(config.auth_whitelist.clone()),
    );
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "subscription API listening");

    let shutdown = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    token.cancel();
    let (manager_result, heartbeat_result) = tokio::join!(manager_task, heartbeat_task);
    for (task, result) in [("subscription manager", manager_result), ("heartbeat", heartbeat_result)] {
        if let Err(e) = result {
            error!(task, error = %e, "background task failed");
        }
    }
    info!("Gateway stopped");
    Ok(())
}

/// Keeps this instance registered in the service metadata aggregate and
/// confirms services whose heartbeat expired.
async fn heartbeat(
    aggregate: Aggregate<ServiceMetadataSnapshotTaken>,
    service_id: String,
    hub_id: String,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(HEARTBEAT_TTL / 3);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Utc::now();
        let ctx = CommandContext::new("", service_id.clone(), hub_id.clone(), now);
        let command = ServiceMetadataCommand::Heartbeat(ServiceHeartbeatRequest {
            service_id: service_id.clone(),
            time_to_live: chrono::Duration::seconds(HEARTBEAT_TTL.as_secs() as i64),
            timestamp: now,
        });
        match aggregate.handle_command(&ctx, command).await {
            Ok(_) => debug!(service_id = %service_id, "heartbeat recorded"),
            Err(HubError::FailedPrecondition(reason)) => {
                error!(service_id = %service_id, reason = %reason, "service expired, stopping heartbeat");
                break;
            }
            Err(e) => {
                warn!(service_id = %service_id, error = %e, "cannot record heartbeat");
                continue;
            }
        }

        let expired: Vec<String> = match aggregate.load().await {
            Ok(loaded) => loaded
                .model
                .services_heartbeat
                .expired
                .iter()
                .map(|s| s.service_id.clone())
                .collect(),
            Err(e) => {
                warn!(error = %e, "cannot load service metadata");
                continue;
            }
        };
        if expired.is_empty() {
            continue;
        }
        let command = ServiceMetadataCommand::ConfirmExpiredServices(ConfirmExpiredServicesRequest {
            service_ids: expired.clone(),
        });
        match aggregate.handle_command(&ctx, command).await {
            Ok(_) => info!(services = ?expired, "confirmed expired services"),
            Err(e) => warn!(error = %e, "cannot confirm expired services"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription Manager
//!
//! Keeps the registry of external subscriptions and their live connections.
//!
//! # Lifecycle
//!
//! ```text
//! store ──▶ Disconnected ──connect──▶ Connecting ──▶ Connected
//!               ▲                         │              │
//!               └──── failure / close ────┴──────────────┘
//! pull_out ──▶ Removed
//! ```
//!
//! The reconnect loop ([`SubscriptionManager::run`]) connects every
//! disconnected subscription on each tick. A subscription has at most one
//! live connection. Each attempt gets a new connection number; a close
//! reported by an older connection is ignored.
//!
//! A source that refuses the subscriber's credentials
//! ([`HubError::is_permanent_refusal`]) will refuse them on every tick, so
//! the reconnect loop tears such a subscription down instead.
//!
//! # Locking
//!
//! The registry and each [`SubscriptionData`] use short critical sections
//! that never span an `.await`.

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::directory::DeviceDirectory;
use super::emit::EventEmitter;
use super::handler::{SubscriptionHandler, Teardown};
use super::source::{EventSource, LiveSubscription, SourceScope};
use super::store::{SubscriptionQuery, SubscriptionStore};
use super::subscription::{EventType, Subscription};
use crate::errors::{HubError, HubResult};
use crate::state_machine::{ConnectionInput, ConnectionState, StateMachine};

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Runtime state of one subscription
#[derive(Debug)]
pub struct SubscriptionData {
    id: String,
    record: Mutex<Subscription>,
    live: Mutex<Option<LiveSubscription>>,
    state: Mutex<ConnectionState>,
    connection: AtomicU64,
}

impl SubscriptionData {
    pub fn new(sub: Subscription) -> Self {
        Self {
            id: sub.id.clone(),
            record: Mutex::new(sub),
            live: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            connection: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cached copy of the stored record.
    pub fn subscription(&self) -> Subscription {
        self.record.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn transition(&self, input: ConnectionInput) -> HubResult<ConnectionState> {
        let mut state = self.state.lock();
        let (next, ()) = state.transition(&input).map_err(|e| {
            HubError::FailedPrecondition(format!("subscription {}: {e}", self.id))
        })?;
        *state = next;
        Ok(next)
    }

    /// Starts a connection attempt and returns its connection number.
    fn begin_connect(&self) -> HubResult<u64> {
        self.transition(ConnectionInput::BeginConnect)?;
        Ok(self.connection.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Reserves the next sequence number in the store, then updates the cache.
    pub async fn next_sequence_number(&self, store: &dyn SubscriptionStore) -> HubResult<u64> {
        let sequence_number = store.increment_sequence_number(&self.id).await?;
        let mut record = self.record.lock();
        record.sequence_number = record.sequence_number.max(sequence_number + 1);
        Ok(sequence_number)
    }

    fn set_live(&self, live: LiveSubscription) {
        *self.live.lock() = Some(live);
    }

    fn mark_initialized(&self) {
        self.record.lock().initialized = true;
    }

    /// The live stream of `connection` ended; the reconnect loop may
    /// connect again.
    pub fn disconnected(&self, connection: u64) {
        if self.connection.load(Ordering::SeqCst) != connection {
            debug!(subscription_id = %self.id, connection, "ignoring close of a previous connection");
            return;
        }
        if let Some(live) = self.live.lock().take() {
            live.cancel();
        }
        if let Err(e) = self.transition(ConnectionInput::Closed) {
            debug!(subscription_id = %self.id, error = %e, "ignoring close");
        }
    }

    fn remove(&self) {
        if let Some(live) = self.live.lock().take() {
            live.cancel();
        }
        let _ = self.transition(ConnectionInput::Remove);
    }
}

/// Registry and connection driver of cloud-to-cloud subscriptions
pub struct SubscriptionManager {
    store: Arc<dyn SubscriptionStore>,
    source: Arc<dyn EventSource>,
    directory: Arc<dyn DeviceDirectory>,
    emitter: EventEmitter,
    reconnect_interval: Duration,
    subscriptions: RwLock<HashMap<String, Arc<SubscriptionData>>>,
    this: Weak<SubscriptionManager>,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        source: Arc<dyn EventSource>,
        directory: Arc<dyn DeviceDirectory>,
        emitter: EventEmitter,
        reconnect_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            source,
            directory,
            emitter,
            reconnect_interval,
            subscriptions: RwLock::new(HashMap::new()),
            this: this.clone(),
        })
    }

    fn get(&self, id: &str) -> HubResult<Arc<SubscriptionData>> {
        self.subscriptions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("subscription {id}")))
    }

    /// Current record of a registered subscription.
    pub fn subscription(&self, id: &str) -> Option<Subscription> {
        self.subscriptions.read().get(id).map(|d| d.subscription())
    }

    pub fn connection_state(&self, id: &str) -> Option<ConnectionState> {
        self.subscriptions.read().get(id).map(|d| d.state())
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Registers a record unless its id is already known.
    fn register(&self, sub: Subscription) -> Arc<SubscriptionData> {
        self.subscriptions
            .write()
            .entry(sub.id.clone())
            .or_insert_with(|| Arc::new(SubscriptionData::new(sub)))
            .clone()
    }

    /// Validates and persists a subscription, then registers it.
    pub async fn store(&self, sub: Subscription) -> HubResult<Subscription> {
        sub.validate()?;
        self.store.save(&sub).await?;
        let data = self.register(sub);
        info!(subscription_id = %data.id(), "stored subscription");
        Ok(data.subscription())
    }

    /// Registers every persisted subscription; returns how many were loaded.
    pub async fn load_subscriptions(&self) -> HubResult<usize> {
        let subscriptions = self.store.load(&SubscriptionQuery::all()).await?;
        let count = subscriptions.len();
        for sub in subscriptions {
            self.register(sub);
        }
        info!(count, "loaded subscriptions");
        Ok(count)
    }

    fn teardown(&self) -> Teardown {
        let manager = self.this.clone();
        Teardown::new(move |id, reason| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let id = id.to_string();
            tokio::spawn(async move { manager.tear_down(&id, reason).await });
        })
    }

    /// Removes a subscription after a fatal failure and notifies the
    /// subscriber.
    async fn tear_down(&self, id: &str, reason: HubError) {
        let Some(href) = self.subscription(id).map(|s| s.href) else {
            return;
        };
        warn!(subscription_id = id, reason = %reason, "tearing down subscription");
        match self.pull_out(id, &href).await {
            Ok(popped) => {
                if let Err(e) = self.cancel_subscription(&popped).await {
                    debug!(subscription_id = id, error = %e, "cannot notify canceled subscription");
                }
            }
            Err(e) => debug!(subscription_id = id, error = %e, "subscription already removed"),
        }
    }

    /// Opens the live connection of a subscription.
    ///
    /// The first connection of an uninitialized subscription delivers the
    /// current state of its scope before marking it initialized. If the
    /// subscriber rejects that delivery for good the subscription is torn
    /// down and `FailedPrecondition` is returned. Any other failure leaves
    /// it disconnected and uninitialized, so the next attempt delivers the
    /// initial state again.
    pub async fn connect(&self, id: &str) -> HubResult<()> {
        let data = self.get(id)?;
        let connection = data.begin_connect()?;

        let handler = Arc::new(SubscriptionHandler::new(
            data.clone(),
            connection,
            self.store.clone(),
            self.emitter.clone(),
            self.teardown(),
        ));
        let sub = data.subscription();

        let initial = match handler.initial_state(self.directory.as_ref()).await {
            Ok(initial) => initial,
            Err(e) => {
                let _ = data.transition(ConnectionInput::Failed);
                return Err(e);
            }
        };

        let live = match self
            .source
            .subscribe(&SourceScope::from(&sub), handler.clone())
            .await
        {
            Ok(live) => live,
            Err(e) => {
                let _ = data.transition(ConnectionInput::Failed);
                return Err(e);
            }
        };

        if data.transition(ConnectionInput::Established).is_err() {
            // pulled out while connecting
            live.cancel();
            return Err(HubError::NotFound(format!("subscription {id}")));
        }
        data.set_live(live);
        debug!(subscription_id = id, "subscription connected");

        if !sub.initialized {
            let delivered = match handler.deliver_all(initial).await {
                Ok(delivered) => delivered,
                Err(e) => {
                    data.disconnected(connection);
                    return Err(e);
                }
            };
            if !delivered || data.state() == ConnectionState::Removed {
                return Err(HubError::FailedPrecondition(format!(
                    "subscription {id} was rejected by the subscriber during initial delivery"
                )));
            }
            if let Err(e) = self.store.set_initialized(id).await {
                data.disconnected(connection);
                return Err(e);
            }
            data.mark_initialized();
            info!(subscription_id = id, "initial state delivered");
        }
        Ok(())
    }

    /// Removes a subscription from the registry and the store.
    ///
    /// `href` must match the stored subscription. The live connection is
    /// canceled best-effort. Returns the popped record, whose sequence
    /// number is the one a cancel notification must carry.
    pub async fn pull_out(&self, id: &str, href: &str) -> HubResult<Subscription> {
        let data = {
            let mut subscriptions = self.subscriptions.write();
            match subscriptions.get(id) {
                Some(data) if data.subscription().href == href => subscriptions.remove(id),
                _ => None,
            }
        };
        let Some(data) = data else {
            return Err(HubError::NotFound(format!("subscription {id} with href '{href}'")));
        };

        let popped = self.store.pop(id).await;
        data.remove();
        match popped {
            Ok(popped) => {
                info!(subscription_id = id, "pulled out subscription");
                Ok(popped)
            }
            Err(e) => {
                warn!(subscription_id = id, error = %e, "cannot pop subscription from store");
                Err(e)
            }
        }
    }

    /// Notifies the subscriber that its subscription is gone.
    pub async fn cancel_subscription(&self, sub: &Subscription) -> HubResult<()> {
        self.emitter
            .emit(
                sub,
                sub.sequence_number,
                EventType::SubscriptionCanceled,
                None,
            )
            .await
            .result
    }

    /// Connects every subscription that has no live connection.
    pub async fn connect_disconnected(&self) {
        let pending: Vec<String> = self
            .subscriptions
            .read()
            .values()
            .filter(|d| d.state() == ConnectionState::Disconnected)
            .map(|d| d.id().to_string())
            .collect();
        let results = join_all(pending.iter().map(|id| self.connect(id))).await;
        for (id, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(e) if e.is_permanent_refusal() => self.tear_down(id, e).await,
                Err(e) => warn!(subscription_id = %id, error = %e, "cannot connect subscription"),
            }
        }
    }

    /// Reconnect loop; returns when `token` is canceled.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.reconnect_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.connect_disconnected().await,
            }
        }
        info!("subscription manager stopped");
    }
}

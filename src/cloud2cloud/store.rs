// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription persistence
//!
//! Two implementations of [`SubscriptionStore`]:
//! - [`InMemorySubscriptionStore`] for tests and single-node setups
//! - [`NatsSubscriptionStore`] on a JetStream key-value bucket, with
//!   compare-and-set revisions guarding every write after creation
//!
//! Removal in the KV store is two steps: an empty tombstone written against
//! the revision that was read, then a purge. A sequence increment that lands
//! between the read and the removal moves the revision, so the pop retries
//! and returns the incremented record.

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::subscription::{Subscription, SubscriptionType};
use crate::errors::{HubError, HubResult};

/// Filter for [`SubscriptionStore::load`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionQuery {
    pub id: Option<String>,
    pub owner: Option<String>,
    pub subscription_type: Option<SubscriptionType>,
    pub device_id: Option<String>,
}

impl SubscriptionQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, sub: &Subscription) -> bool {
        self.id.as_ref().map_or(true, |id| *id == sub.id)
            && self.owner.as_ref().map_or(true, |o| *o == sub.owner)
            && self
                .subscription_type
                .map_or(true, |t| t == sub.subscription_type)
            && self
                .device_id
                .as_ref()
                .map_or(true, |d| *d == sub.device_id)
    }
}

/// Persistence of subscription records
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Stores a new subscription; `AlreadyExists` when the id is taken.
    async fn save(&self, sub: &Subscription) -> HubResult<()>;

    /// Removes and returns a subscription; `NotFound` when absent.
    async fn pop(&self, id: &str) -> HubResult<Subscription>;

    async fn load(&self, query: &SubscriptionQuery) -> HubResult<Vec<Subscription>>;

    /// Increments the sequence number and returns the value before the
    /// increment.
    async fn increment_sequence_number(&self, id: &str) -> HubResult<u64>;

    async fn set_initialized(&self, id: &str) -> HubResult<()>;
}

fn not_found(id: &str) -> HubError {
    HubError::NotFound(format!("subscription {id}"))
}

/// In-memory subscription store
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn save(&self, sub: &Subscription) -> HubResult<()> {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&sub.id) {
            return Err(HubError::AlreadyExists(format!("subscription {}", sub.id)));
        }
        subscriptions.insert(sub.id.clone(), sub.clone());
        Ok(())
    }

    async fn pop(&self, id: &str) -> HubResult<Subscription> {
        self.subscriptions
            .lock()
            .remove(id)
            .ok_or_else(|| not_found(id))
    }

    async fn load(&self, query: &SubscriptionQuery) -> HubResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect())
    }

    async fn increment_sequence_number(&self, id: &str) -> HubResult<u64> {
        let mut subscriptions = self.subscriptions.lock();
        let sub = subscriptions.get_mut(id).ok_or_else(|| not_found(id))?;
        let current = sub.sequence_number;
        sub.sequence_number += 1;
        Ok(current)
    }

    async fn set_initialized(&self, id: &str) -> HubResult<()> {
        let mut subscriptions = self.subscriptions.lock();
        let sub = subscriptions.get_mut(id).ok_or_else(|| not_found(id))?;
        sub.initialized = true;
        Ok(())
    }
}

/// Attempts of a compare-and-set update before giving up
const CAS_RETRY_LIMIT: usize = 16;

/// Subscription store on a JetStream key-value bucket keyed by subscription id
pub struct NatsSubscriptionStore {
    bucket: kv::Store,
}

impl NatsSubscriptionStore {
    /// Opens the bucket, creating it when missing.
    pub async fn new(jetstream: &jetstream::Context, bucket: &str) -> HubResult<Self> {
        let store = match jetstream.get_key_value(bucket).await {
            Ok(store) => store,
            Err(_) => jetstream
                .create_key_value(kv::Config {
                    bucket: bucket.to_string(),
                    history: 1,
                    ..Default::default()
                })
                .await
                .map_err(|e| HubError::Nats(e.to_string()))?,
        };
        Ok(Self { bucket: store })
    }

    async fn entry(&self, id: &str) -> HubResult<Option<(Subscription, u64)>> {
        let entry = self
            .bucket
            .entry(id)
            .await
            .map_err(|e| HubError::Nats(e.to_string()))?;
        match entry {
            // an empty value is the tombstone of a pop
            Some(entry)
                if matches!(entry.operation, kv::Operation::Put) && !entry.value.is_empty() =>
            {
                let sub = serde_json::from_slice(&entry.value)?;
                Ok(Some((sub, entry.revision)))
            }
            _ => Ok(None),
        }
    }

    /// Read-modify-write guarded by the entry revision.
    async fn modify<T: Send>(
        &self,
        id: &str,
        mut change: impl FnMut(&mut Subscription) -> T + Send,
    ) -> HubResult<T> {
        for _ in 0..CAS_RETRY_LIMIT {
            let Some((mut sub, revision)) = self.entry(id).await? else {
                return Err(not_found(id));
            };
            let result = change(&mut sub);
            let payload = serde_json::to_vec(&sub)?;
            match self.bucket.update(id, payload.into(), revision).await {
                Ok(_) => return Ok(result),
                Err(e) => debug!(subscription_id = id, error = %e, "revision changed, retrying"),
            }
        }
        Err(HubError::Unavailable(format!(
            "cannot update subscription {id}: too many concurrent writers"
        )))
    }
}

#[async_trait]
impl SubscriptionStore for NatsSubscriptionStore {
    async fn save(&self, sub: &Subscription) -> HubResult<()> {
        let payload = serde_json::to_vec(sub)?;
        // revision 0: only succeeds while the key has never been written
        if let Err(e) = self.bucket.update(&sub.id, payload.into(), 0).await {
            if self.entry(&sub.id).await?.is_some() {
                return Err(HubError::AlreadyExists(format!("subscription {}", sub.id)));
            }
            return Err(HubError::Nats(format!("cannot save subscription {}: {e}", sub.id)));
        }
        Ok(())
    }

    async fn pop(&self, id: &str) -> HubResult<Subscription> {
        for _ in 0..CAS_RETRY_LIMIT {
            let Some((sub, revision)) = self.entry(id).await? else {
                return Err(not_found(id));
            };
            if let Err(e) = self.bucket.update(id, Bytes::new(), revision).await {
                debug!(subscription_id = id, error = %e, "revision changed, retrying pop");
                continue;
            }
            if let Err(e) = self.bucket.purge(id).await {
                // the tombstone already hides the record
                warn!(subscription_id = id, error = %e, "cannot purge popped subscription");
            }
            return Ok(sub);
        }
        Err(HubError::Unavailable(format!(
            "cannot remove subscription {id}: too many concurrent writers"
        )))
    }

    async fn load(&self, query: &SubscriptionQuery) -> HubResult<Vec<Subscription>> {
        if let Some(id) = &query.id {
            return Ok(self
                .entry(id)
                .await?
                .map(|(sub, _)| sub)
                .filter(|sub| query.matches(sub))
                .into_iter()
                .collect());
        }

        let keys: Vec<String> = self
            .bucket
            .keys()
            .await
            .map_err(|e| HubError::Nats(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| HubError::Nats(e.to_string()))?;

        let mut subscriptions = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((sub, _)) = self.entry(&key).await? {
                if query.matches(&sub) {
                    subscriptions.push(sub);
                }
            }
        }
        Ok(subscriptions)
    }

    async fn increment_sequence_number(&self, id: &str) -> HubResult<u64> {
        self.modify(id, |sub| {
            let current = sub.sequence_number;
            sub.sequence_number += 1;
            current
        })
        .await
    }

    async fn set_initialized(&self, id: &str) -> HubResult<()> {
        self.modify(id, |sub| sub.initialized = true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud2cloud::subscription::EventType;
    use pretty_assertions::assert_eq;

    fn subscription(owner: &str) -> Subscription {
        Subscription::new(
            SubscriptionType::Devices,
            "http://localhost/events",
            vec![EventType::DevicesOnline],
            "secret",
            owner,
        )
    }

    #[tokio::test]
    async fn test_save_rejects_duplicates() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription("alice");
        store.save(&sub).await.unwrap();
        assert!(matches!(
            store.save(&sub).await,
            Err(HubError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_pop_returns_record_once() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription("alice");
        store.save(&sub).await.unwrap();
        store.increment_sequence_number(&sub.id).await.unwrap();

        let popped = store.pop(&sub.id).await.unwrap();
        assert_eq!(popped.sequence_number, 1);
        assert!(matches!(store.pop(&sub.id).await, Err(HubError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_by_query() {
        let store = InMemorySubscriptionStore::new();
        let alice = subscription("alice");
        let bob = subscription("bob");
        store.save(&alice).await.unwrap();
        store.save(&bob).await.unwrap();

        let query = SubscriptionQuery {
            owner: Some("bob".into()),
            ..SubscriptionQuery::default()
        };
        assert_eq!(store.load(&query).await.unwrap(), vec![bob]);
        assert_eq!(store.load(&SubscriptionQuery::all()).await.unwrap().len(), 2);
        assert_eq!(
            store.load(&SubscriptionQuery::by_id(&alice.id)).await.unwrap(),
            vec![alice]
        );
    }

    #[tokio::test]
    async fn test_set_initialized() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription("alice");
        store.save(&sub).await.unwrap();
        store.set_initialized(&sub.id).await.unwrap();
        assert!(store.pop(&sub.id).await.unwrap().initialized);
        assert!(store.set_initialized(&sub.id).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires NATS server with JetStream
    async fn test_nats_store_sequence_numbers() -> HubResult<()> {
        let client = async_nats::connect("nats://localhost:4222")
            .await
            .map_err(|e| HubError::Nats(e.to_string()))?;
        let jetstream = jetstream::new(client);
        let store = NatsSubscriptionStore::new(&jetstream, "c2c-subscriptions-test").await?;

        let sub = subscription("alice");
        store.save(&sub).await?;
        assert_eq!(store.increment_sequence_number(&sub.id).await?, 0);
        assert_eq!(store.increment_sequence_number(&sub.id).await?, 1);
        assert_eq!(store.pop(&sub.id).await?.sequence_number, 2);
        Ok(())
    }
}

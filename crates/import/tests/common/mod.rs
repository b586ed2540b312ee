use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vrfleet_client::memory::MemoryStore;
use vrfleet_client::{ClientError, EntityStore, Filter, Gateway, Record};
use vrfleet_core::backoff::{BackoffStrategy, RetryPolicy};
use vrfleet_core::models::{APP_ENTITY, DEVICE_ENTITY};

pub fn gateway(store: &Arc<MemoryStore>) -> Gateway {
    Gateway::new(store.clone())
        .with_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            strategy: BackoffStrategy::Linear,
        })
        .with_pacing(Duration::ZERO)
}

/// Seed devices as `(id, binocular_number, model)`.
pub async fn seed_devices(store: &MemoryStore, devices: &[(&str, i64, &str)]) {
    let rows = devices
        .iter()
        .map(|(id, number, model)| json!({"id": id, "binocular_number": number, "model": model}))
        .collect();
    store.seed(DEVICE_ENTITY, rows).await;
}

/// Seed apps as `(id, name)`.
pub async fn seed_apps(store: &MemoryStore, apps: &[(&str, &str)]) {
    let rows = apps
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name, "is_installed": false}))
        .collect();
    store.seed(APP_ENTITY, rows).await;
}

/// First row of `entity` whose `field` equals `value`.
pub async fn find_row(store: &MemoryStore, entity: &str, field: &str, value: Value) -> Option<Value> {
    store
        .rows(entity)
        .await
        .into_iter()
        .find(|row| row.get(field) == Some(&value))
}

/// [`MemoryStore`] whose reads of one collection answer 503.
pub struct UnavailableStore {
    pub inner: MemoryStore,
    pub entity: &'static str,
}

impl UnavailableStore {
    pub fn new(entity: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            entity,
        }
    }

    fn check(&self, entity: &str) -> Result<(), ClientError> {
        if entity == self.entity {
            return Err(ClientError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for UnavailableStore {
    async fn list(&self, entity: &str) -> Result<Vec<Record>, ClientError> {
        self.check(entity)?;
        self.inner.list(entity).await
    }

    async fn filter(&self, entity: &str, predicate: &Filter) -> Result<Vec<Record>, ClientError> {
        self.check(entity)?;
        self.inner.filter(entity, predicate).await
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Record, ClientError> {
        self.inner.get(entity, id).await
    }

    async fn create(&self, entity: &str, payload: &Value) -> Result<Record, ClientError> {
        self.inner.create(entity, payload).await
    }

    async fn update(&self, entity: &str, id: &str, patch: &Value) -> Result<Record, ClientError> {
        self.inner.update(entity, id, patch).await
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), ClientError> {
        self.inner.delete(entity, id).await
    }
}

pub fn unavailable_gateway(store: &Arc<UnavailableStore>) -> Gateway {
    Gateway::new(store.clone())
        .with_policy(RetryPolicy::no_retry())
        .with_pacing(Duration::ZERO)
}

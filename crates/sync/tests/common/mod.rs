use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vrfleet_client::memory::MemoryStore;
use vrfleet_client::store::matches_filter;
use vrfleet_client::{ClientError, EntityStore, Filter, Gateway, Record};
use vrfleet_core::backoff::{BackoffStrategy, RetryPolicy};
use vrfleet_core::models::{APP_ENTITY, ASSOCIATION_ENTITY, DEVICE_ENTITY};

/// [`MemoryStore`] wrapper that injects failures and counts writes.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing_creates: Mutex<Vec<(String, Filter)>>,
    failing_deletes: Mutex<Vec<(String, String)>>,
    throttled_creates: AtomicU32,
    pub creates: AtomicU32,
    pub deletes: AtomicU32,
}

impl FlakyStore {
    /// Every create on `entity` whose payload matches `filter` fails with a
    /// 500.
    pub fn fail_creates(&self, entity: &str, filter: Filter) {
        self.failing_creates
            .lock()
            .unwrap()
            .push((entity.to_string(), filter));
    }

    /// Every delete of row `id` in `entity` fails with a 500.
    pub fn fail_deletes(&self, entity: &str, id: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .push((entity.to_string(), id.to_string()));
    }

    /// The next `n` creates are answered with 429.
    pub fn throttle_creates(&self, n: u32) {
        self.throttled_creates.store(n, Ordering::SeqCst);
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u32 {
        self.deletes.load(Ordering::SeqCst)
    }
}

fn server_error() -> ClientError {
    ClientError::Api {
        status: 500,
        body: "injected failure".to_string(),
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn list(&self, entity: &str) -> Result<Vec<Record>, ClientError> {
        self.inner.list(entity).await
    }

    async fn filter(&self, entity: &str, predicate: &Filter) -> Result<Vec<Record>, ClientError> {
        self.inner.filter(entity, predicate).await
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Record, ClientError> {
        self.inner.get(entity, id).await
    }

    async fn create(&self, entity: &str, payload: &Value) -> Result<Record, ClientError> {
        let throttled = self
            .throttled_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(ClientError::RateLimited("status 429".to_string()));
        }
        let fails = self
            .failing_creates
            .lock()
            .unwrap()
            .iter()
            .any(|(e, f)| e == entity && matches_filter(payload, f));
        if fails {
            return Err(server_error());
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(entity, payload).await
    }

    async fn update(&self, entity: &str, id: &str, patch: &Value) -> Result<Record, ClientError> {
        self.inner.update(entity, id, patch).await
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), ClientError> {
        let fails = self
            .failing_deletes
            .lock()
            .unwrap()
            .iter()
            .any(|(e, i)| e == entity && i == id);
        if fails {
            return Err(server_error());
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(entity, id).await
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
        strategy: BackoffStrategy::Linear,
    }
}

pub fn gateway(store: &Arc<FlakyStore>) -> Gateway {
    Gateway::new(store.clone())
        .with_policy(fast_policy())
        .with_pacing(Duration::ZERO)
}

/// Seed devices as `(id, binocular_number, is_disabled)`.
pub async fn seed_devices(store: &FlakyStore, devices: &[(&str, i64, bool)]) {
    let rows = devices
        .iter()
        .map(|(id, number, disabled)| {
            json!({"id": id, "binocular_number": number, "is_disabled": disabled})
        })
        .collect();
    store.inner.seed(DEVICE_ENTITY, rows).await;
}

/// Seed apps as `(id, name, is_installed)`.
pub async fn seed_apps(store: &FlakyStore, apps: &[(&str, &str, bool)]) {
    let rows = apps
        .iter()
        .map(|(id, name, installed)| json!({"id": id, "name": name, "is_installed": installed}))
        .collect();
    store.inner.seed(APP_ENTITY, rows).await;
}

/// Seed associations as `(id, device_id, app_id)`.
pub async fn seed_links(store: &FlakyStore, links: &[(&str, &str, &str)]) {
    let rows = links
        .iter()
        .map(|(id, device, app)| json!({"id": id, "device_id": device, "app_id": app}))
        .collect();
    store.inner.seed(ASSOCIATION_ENTITY, rows).await;
}

/// Device ids linked to `app_id`, sorted.
pub async fn devices_of(store: &FlakyStore, app_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = store
        .inner
        .rows(ASSOCIATION_ENTITY)
        .await
        .iter()
        .filter(|r| r["app_id"] == json!(app_id))
        .filter_map(|r| r["device_id"].as_str().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

/// Current `is_installed` flag of an app row.
pub async fn installed_flag(store: &FlakyStore, app_id: &str) -> bool {
    store
        .inner
        .get(APP_ENTITY, app_id)
        .await
        .unwrap()
        .get("is_installed")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

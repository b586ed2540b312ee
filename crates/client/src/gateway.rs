//! Typed access to the entity backend with retry, rate limiting and pacing.
//!
//! Every call made through a [`Gateway`] acquires the shared limiter (when
//! configured) and is wrapped in [`with_rate_limit_retry`]. Batch loops
//! call [`Gateway::pause`] between items.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use vrfleet_core::backoff::RetryPolicy;
use vrfleet_core::models::Entity;

use crate::error::ClientError;
use crate::retry::{with_rate_limit_retry, RateLimiter};
use crate::store::{EntityStore, Filter, Record};

/// Default sleep between consecutive calls of a batch.
pub const DEFAULT_PACING: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
    pacing: Duration,
}

impl Gateway {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
            limiter: None,
            pacing: DEFAULT_PACING,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Sleep the pacing delay between batch calls.
    pub async fn pause(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    /// Run one backend call through the limiter and the retry wrapper.
    async fn call<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        with_rate_limit_retry(&self.policy, operation, || {
            let limiter = self.limiter.clone();
            let fut = f();
            async move {
                if let Some(limiter) = limiter {
                    limiter.acquire().await;
                }
                fut.await
            }
        })
        .await
    }

    // ---- raw collections ----

    pub async fn list_in<T: DeserializeOwned>(&self, entity: &str) -> Result<Vec<T>, ClientError> {
        let store = &self.store;
        let rows = self.call("list", move || store.list(entity)).await?;
        decode_rows(rows)
    }

    pub async fn filter_in<T: DeserializeOwned>(
        &self,
        entity: &str,
        predicate: &Filter,
    ) -> Result<Vec<T>, ClientError> {
        let store = &self.store;
        let rows = self
            .call("filter", move || store.filter(entity, predicate))
            .await?;
        decode_rows(rows)
    }

    pub async fn create_in<T: DeserializeOwned, D: Serialize>(
        &self,
        entity: &str,
        draft: &D,
    ) -> Result<T, ClientError> {
        let payload = serde_json::to_value(draft)?;
        let (store, payload) = (&self.store, &payload);
        let row = self
            .call("create", move || store.create(entity, payload))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn update_in<T: DeserializeOwned>(
        &self,
        entity: &str,
        id: &str,
        patch: &Value,
    ) -> Result<T, ClientError> {
        let store = &self.store;
        let row = self
            .call("update", move || store.update(entity, id, patch))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn delete(&self, entity: &str, id: &str) -> Result<(), ClientError> {
        let store = &self.store;
        self.call("delete", move || store.delete(entity, id)).await
    }

    /// Delete a row, treating "not found" as already deleted. Returns
    /// whether a row was actually removed.
    pub async fn delete_if_present(&self, entity: &str, id: &str) -> Result<bool, ClientError> {
        match self.delete(entity, id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                tracing::debug!(entity, id, "Row already gone");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ---- typed entities ----

    pub async fn list<T: Entity>(&self) -> Result<Vec<T>, ClientError> {
        self.list_in(T::NAME).await
    }

    pub async fn filter<T: Entity>(&self, predicate: &Filter) -> Result<Vec<T>, ClientError> {
        self.filter_in(T::NAME, predicate).await
    }

    pub async fn get<T: Entity>(&self, id: &str) -> Result<T, ClientError> {
        let store = &self.store;
        let row = self.call("get", move || store.get(T::NAME, id)).await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn create<T: Entity, D: Serialize>(&self, draft: &D) -> Result<T, ClientError> {
        self.create_in(T::NAME, draft).await
    }

    pub async fn update<T: Entity>(&self, id: &str, patch: &Value) -> Result<T, ClientError> {
        self.update_in(T::NAME, id, patch).await
    }

    pub async fn bulk_create<T: Entity, D: Serialize>(&self, drafts: &[D]) -> Result<Vec<T>, ClientError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let payloads = drafts
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let (store, payloads) = (&self.store, payloads.as_slice());
        let rows = self
            .call("bulk_create", move || store.bulk_create(T::NAME, payloads))
            .await?;
        decode_rows(rows)
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Record>) -> Result<Vec<T>, ClientError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(ClientError::from))
        .collect()
}

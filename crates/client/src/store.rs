//! The generic entity collection surface every backend implements.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ClientError;

/// A raw backend row. Always a JSON object carrying an `id`.
pub type Record = Value;

/// Equality predicate: every key must equal the row's field.
pub type Filter = Map<String, Value>;

/// Build a [`Filter`] from `(field, value)` pairs.
pub fn filter_by<I, K, V>(pairs: I) -> Filter
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Whether `record` satisfies every clause of `filter`.
pub fn matches_filter(record: &Record, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, wanted)| record.get(field) == Some(wanted))
}

/// CRUD over named entity collections (`VRDevice`, `DeviceApp`, ...).
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn list(&self, entity: &str) -> Result<Vec<Record>, ClientError>;

    async fn filter(&self, entity: &str, predicate: &Filter) -> Result<Vec<Record>, ClientError>;

    async fn get(&self, entity: &str, id: &str) -> Result<Record, ClientError>;

    async fn create(&self, entity: &str, payload: &Value) -> Result<Record, ClientError>;

    async fn update(&self, entity: &str, id: &str, patch: &Value) -> Result<Record, ClientError>;

    async fn delete(&self, entity: &str, id: &str) -> Result<(), ClientError>;

    /// Create several rows. Stores without a bulk endpoint create them one
    /// at a time.
    async fn bulk_create(&self, entity: &str, payloads: &[Value]) -> Result<Vec<Record>, ClientError> {
        let mut created = Vec::with_capacity(payloads.len());
        for payload in payloads {
            created.push(self.create(entity, payload).await?);
        }
        Ok(created)
    }
}

//! In-process [`EntityStore`] used by tests and dry runs.
//!
//! Rows keep insertion order per collection. Like the hosted backend it
//! enforces no uniqueness or foreign keys.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ClientError;
use crate::store::{matches_filter, EntityStore, Filter, Record};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows verbatim, keeping any `id` they carry and assigning one
    /// otherwise. Returns the stored rows.
    pub async fn seed(&self, entity: &str, rows: Vec<Value>) -> Vec<Record> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(entity.to_string()).or_default();
        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            if let Value::Object(map) = &mut row {
                map.entry("id").or_insert_with(|| Value::String(new_id()));
            }
            table.push(row.clone());
            stored.push(row);
        }
        stored
    }

    /// Snapshot of a collection.
    pub async fn rows(&self, entity: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, entity: &str) -> usize {
        self.tables.read().await.get(entity).map_or(0, Vec::len)
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn row_id(row: &Record) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn not_found(entity: &str, id: &str) -> ClientError {
    ClientError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

fn not_an_object(what: &str) -> ClientError {
    ClientError::Api {
        status: 400,
        body: format!("{what} must be a JSON object"),
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list(&self, entity: &str) -> Result<Vec<Record>, ClientError> {
        Ok(self.rows(entity).await)
    }

    async fn filter(&self, entity: &str, predicate: &Filter) -> Result<Vec<Record>, ClientError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(entity)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filter(row, predicate))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Record, ClientError> {
        let tables = self.tables.read().await;
        tables
            .get(entity)
            .and_then(|rows| rows.iter().find(|row| row_id(row) == Some(id)))
            .cloned()
            .ok_or_else(|| not_found(entity, id))
    }

    async fn create(&self, entity: &str, payload: &Value) -> Result<Record, ClientError> {
        let Value::Object(fields) = payload else {
            return Err(not_an_object("payload"));
        };
        let mut row = fields.clone();
        row.insert("id".to_string(), Value::String(new_id()));
        let row = Value::Object(row);

        let mut tables = self.tables.write().await;
        tables.entry(entity.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, entity: &str, id: &str, patch: &Value) -> Result<Record, ClientError> {
        let Value::Object(changes) = patch else {
            return Err(not_an_object("patch"));
        };
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(entity)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
            .ok_or_else(|| not_found(entity, id))?;
        if let Value::Object(fields) = &mut *row {
            for (key, value) in changes {
                if key != "id" {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), ClientError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(entity).ok_or_else(|| not_found(entity, id))?;
        let index = rows
            .iter()
            .position(|row| row_id(row) == Some(id))
            .ok_or_else(|| not_found(entity, id))?;
        rows.remove(index);
        Ok(())
    }
}

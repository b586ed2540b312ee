//! Composite keys and pure bookkeeping over device↔app join rows.
//!
//! The backend enforces no uniqueness or foreign keys on `DeviceApp`, so
//! the helpers here detect duplicate rows for one pair and rows whose
//! device or app no longer exists.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::Association;
use crate::types::EntityId;

/// Structural `(device_id, app_id)` key of an association row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssociationKey {
    pub device_id: EntityId,
    pub app_id: EntityId,
}

impl AssociationKey {
    pub fn new(device_id: impl Into<EntityId>, app_id: impl Into<EntityId>) -> Self {
        Self {
            device_id: device_id.into(),
            app_id: app_id.into(),
        }
    }
}

impl Association {
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.device_id.clone(), self.app_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Relation index
// ---------------------------------------------------------------------------

/// Set of pairs known to be linked, consulted before every insert so a
/// pair is never created twice.
#[derive(Debug, Clone, Default)]
pub struct RelationIndex {
    keys: HashSet<AssociationKey>,
}

impl RelationIndex {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Association>) -> Self {
        Self {
            keys: rows.into_iter().map(Association::key).collect(),
        }
    }

    pub fn contains(&self, key: &AssociationKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the pair was already present.
    pub fn insert(&mut self, key: AssociationKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: &AssociationKey) -> bool {
        self.keys.remove(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Duplicate / orphan detection
// ---------------------------------------------------------------------------

/// Why a row is scheduled for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    MissingDevice,
    MissingApp,
    Duplicate,
}

impl StaleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingDevice => "missing_device",
            Self::MissingApp => "missing_app",
            Self::Duplicate => "duplicate",
        }
    }
}

/// A row that should be deleted, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleRow {
    pub row: Association,
    pub reason: StaleReason,
}

/// Partition of association rows into rows to keep and rows to delete.
#[derive(Debug, Clone, Default)]
pub struct RowAudit {
    pub kept: Vec<Association>,
    pub stale: Vec<StaleRow>,
}

/// Split `rows` into live rows and stale ones.
///
/// `device_exists` / `app_exists` decide orphan status; pass `|_| true`
/// for a side that is fixed by the query (e.g. rows filtered by app id).
/// For each pair the first row in input order is kept and later ones are
/// duplicates. Orphans are never counted as the kept row of a pair.
pub fn audit_rows(
    rows: Vec<Association>,
    device_exists: impl Fn(&str) -> bool,
    app_exists: impl Fn(&str) -> bool,
) -> RowAudit {
    let mut seen: HashSet<AssociationKey> = HashSet::new();
    let mut audit = RowAudit::default();

    for row in rows {
        let reason = if !device_exists(&row.device_id) {
            Some(StaleReason::MissingDevice)
        } else if !app_exists(&row.app_id) {
            Some(StaleReason::MissingApp)
        } else if !seen.insert(row.key()) {
            Some(StaleReason::Duplicate)
        } else {
            None
        };

        match reason {
            Some(reason) => audit.stale.push(StaleRow { row, reason }),
            None => audit.kept.push(row),
        }
    }

    audit
}

/// Number of association rows per app id.
pub fn count_by_app<'a>(rows: impl IntoIterator<Item = &'a Association>) -> HashMap<EntityId, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        *counts.entry(row.app_id.clone()).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

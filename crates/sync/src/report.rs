//! Outcome records for batch operations.
//!
//! Batches never roll back: every item ends up in exactly one of the
//! applied, skipped or failed lists.

use serde::Serialize;
use vrfleet_core::types::EntityId;

/// An item that was not applied, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemIssue<K> {
    pub key: K,
    pub message: String,
}

impl<K> ItemIssue<K> {
    pub fn new(key: K, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

/// Result of one reconciliation run.
///
/// `K` is the binocular number for app-side runs and the app id for
/// device-side runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport<K> {
    pub added: Vec<K>,
    pub removed: Vec<K>,
    pub skipped: Vec<ItemIssue<K>>,
    pub failures: Vec<ItemIssue<K>>,
    /// Orphan or duplicate rows deleted while loading current state.
    pub healed: usize,
    /// Stale rows that could not be deleted, keyed by association id.
    pub heal_failures: Vec<ItemIssue<EntityId>>,
    /// Final derived flag of the edited app (app-side runs only).
    pub is_installed: Option<bool>,
}

impl<K> Default for ReconcileReport<K> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            healed: 0,
            heal_failures: Vec::new(),
            is_installed: None,
        }
    }
}

impl<K> ReconcileReport<K> {
    /// Nothing was created, deleted or healed.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.healed == 0
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() || !self.heal_failures.is_empty()
    }
}

/// Result of rewriting derived `is_installed` flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    /// Apps whose flag was rewritten.
    pub updated: Vec<EntityId>,
    pub failures: Vec<ItemIssue<EntityId>>,
}

impl RefreshReport {
    pub fn merge(&mut self, other: RefreshReport) {
        self.checked += other.checked;
        self.updated.extend(other.updated);
        self.failures.extend(other.failures);
    }
}

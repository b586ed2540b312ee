//! Set-difference planning for device↔app reconciliation.
//!
//! Pure logic: given the set of keys that should be linked and the set
//! that currently is, compute the minimal adds and removes. Keys are
//! binocular numbers (app-side editing) or app ids (device-side editing).

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::BinocularNumber;

/// Minimal change set turning `current` into `target`.
///
/// Invariants: `to_add ∩ to_remove = ∅` and
/// `(current ∪ to_add) − to_remove = target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delta<K: Ord> {
    pub to_add: BTreeSet<K>,
    pub to_remove: BTreeSet<K>,
}

impl<K: Ord + Clone> Delta<K> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Set that results from applying this delta to `current`.
    pub fn apply(&self, current: &BTreeSet<K>) -> BTreeSet<K> {
        current
            .union(&self.to_add)
            .filter(|k| !self.to_remove.contains(*k))
            .cloned()
            .collect()
    }
}

/// `to_add = target − current`, `to_remove = current − target`.
pub fn plan_delta<K: Ord + Clone>(target: &BTreeSet<K>, current: &BTreeSet<K>) -> Delta<K> {
    Delta {
        to_add: target.difference(current).cloned().collect(),
        to_remove: current.difference(target).cloned().collect(),
    }
}

/// Target device set for app-side editing: the explicit selection plus the
/// device pinned by the navigation context. Set union makes a number that
/// appears in both count once.
pub fn device_target(
    selected: &[BinocularNumber],
    pinned: Option<BinocularNumber>,
) -> BTreeSet<BinocularNumber> {
    selected.iter().copied().chain(pinned).collect()
}

//! Create/delete primitives on the `DeviceApp` join entity.

use serde_json::json;
use vrfleet_client::{filter_by, ClientError, Gateway};
use vrfleet_core::association::{AssociationKey, RelationIndex, StaleRow};
use vrfleet_core::models::{Association, AssociationDraft, ASSOCIATION_ENTITY};
use vrfleet_core::types::EntityId;

use crate::report::ItemIssue;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    Created(Association),
    /// The relation index already holds the pair; no call was made.
    AlreadyLinked,
}

/// Link a device to an app unless the index already knows the pair.
pub async fn link(
    gw: &Gateway,
    index: &mut RelationIndex,
    device_id: &str,
    app_id: &str,
) -> Result<LinkOutcome, ClientError> {
    let key = AssociationKey::new(device_id, app_id);
    if index.contains(&key) {
        return Ok(LinkOutcome::AlreadyLinked);
    }
    let row: Association = gw
        .create(&AssociationDraft::installed_today(device_id, app_id))
        .await?;
    index.insert(key);
    tracing::debug!(device_id, app_id, association_id = %row.id, "Linked device to app");
    Ok(LinkOutcome::Created(row))
}

/// Delete every row linking the pair. Rows are re-queried first so
/// duplicates created elsewhere go too; rows already gone count as
/// deleted. Returns the number of rows removed.
pub async fn unlink(
    gw: &Gateway,
    index: &mut RelationIndex,
    device_id: &str,
    app_id: &str,
) -> Result<usize, ClientError> {
    let rows: Vec<Association> = gw
        .filter(&filter_by([
            ("device_id", json!(device_id)),
            ("app_id", json!(app_id)),
        ]))
        .await?;

    let mut removed = 0;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            gw.pause().await;
        }
        if gw.delete_if_present(ASSOCIATION_ENTITY, &row.id).await? {
            removed += 1;
        }
    }
    index.remove(&AssociationKey::new(device_id, app_id));
    tracing::debug!(device_id, app_id, removed, "Unlinked device from app");
    Ok(removed)
}

/// Rows removed by [`delete_stale`] and the ones that could not be.
#[derive(Debug, Default)]
pub struct StaleDeletion {
    pub deleted: usize,
    /// Keyed by association id.
    pub failures: Vec<ItemIssue<EntityId>>,
}

/// Delete stale rows found by an audit. A failed delete is logged and the
/// rest of the batch still runs.
pub async fn delete_stale(gw: &Gateway, stale: &[StaleRow]) -> StaleDeletion {
    let mut outcome = StaleDeletion::default();
    for (i, stale_row) in stale.iter().enumerate() {
        if i > 0 {
            gw.pause().await;
        }
        match gw.delete_if_present(ASSOCIATION_ENTITY, &stale_row.row.id).await {
            Ok(_) => {
                outcome.deleted += 1;
                tracing::info!(
                    association_id = %stale_row.row.id,
                    device_id = %stale_row.row.device_id,
                    app_id = %stale_row.row.app_id,
                    reason = stale_row.reason.as_str(),
                    "Deleted stale association",
                );
            }
            Err(e) => {
                tracing::warn!(
                    association_id = %stale_row.row.id,
                    error = %e,
                    "Failed to delete stale association",
                );
                outcome
                    .failures
                    .push(ItemIssue::new(stale_row.row.id.clone(), e.to_string()));
            }
        }
    }
    outcome
}

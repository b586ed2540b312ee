//! Linked-account upsert keyed by `(device_id, account_type)`.

use serde_json::json;
use vrfleet_client::{filter_by, Gateway};
use vrfleet_core::models::{Credentials, LinkedAccount, LinkedAccountDraft, LINKED_ACCOUNT_ENTITY};
use vrfleet_core::types::EntityId;

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOutcome {
    pub account_id: EntityId,
    pub action: AccountAction,
    /// Extra rows for the same key that were deleted.
    pub duplicates_removed: usize,
}

/// Update the device's account of `account_type`, or create it.
///
/// When several rows share the key the first is kept and the rest are
/// deleted.
pub async fn upsert_linked_account(
    gw: &Gateway,
    device_id: &str,
    account_type: &str,
    credentials: &Credentials,
) -> Result<AccountOutcome, SyncError> {
    let account_type = account_type.trim();
    if account_type.is_empty() {
        return Err(SyncError::validation("account_type must not be empty"));
    }
    if device_id.trim().is_empty() {
        return Err(SyncError::validation("device_id must not be empty"));
    }

    let mut matches: Vec<LinkedAccount> = gw
        .filter(&filter_by([
            ("device_id", json!(device_id)),
            ("account_type", json!(account_type)),
        ]))
        .await?;

    if matches.is_empty() {
        let created: LinkedAccount = gw
            .create(&LinkedAccountDraft {
                device_id: device_id.to_string(),
                account_type: account_type.to_string(),
                credentials: credentials.clone(),
            })
            .await?;
        tracing::info!(device_id, account_type, account_id = %created.id, "Created linked account");
        return Ok(AccountOutcome {
            account_id: created.id,
            action: AccountAction::Created,
            duplicates_removed: 0,
        });
    }

    let keep = matches.remove(0);
    let mut duplicates_removed = 0;
    for extra in &matches {
        gw.pause().await;
        match gw.delete_if_present(LINKED_ACCOUNT_ENTITY, &extra.id).await {
            Ok(_) => duplicates_removed += 1,
            Err(e) => {
                tracing::warn!(account_id = %extra.id, error = %e, "Failed to delete duplicate linked account");
            }
        }
    }

    let action = match credentials.changes_from(&keep) {
        Some(patch) => {
            let _: LinkedAccount = gw.update(&keep.id, &patch).await?;
            tracing::info!(device_id, account_type, account_id = %keep.id, "Updated linked account");
            AccountAction::Updated
        }
        None => AccountAction::Unchanged,
    };

    Ok(AccountOutcome {
        account_id: keep.id,
        action,
        duplicates_removed,
    })
}

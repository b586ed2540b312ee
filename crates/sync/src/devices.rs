//! Device maintenance: soft-disable and destructive cascade delete.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::json;
use vrfleet_client::{filter_by, Gateway};
use vrfleet_core::models::{
    Association, Device, LinkedAccount, ASSOCIATION_ENTITY, DEVICE_ENTITY, LINKED_ACCOUNT_ENTITY,
};
use vrfleet_core::types::EntityId;

use crate::error::SyncError;
use crate::installed::refresh_apps;
use crate::report::{ItemIssue, RefreshReport};

/// Disable (with a mandatory reason) or re-enable a device.
pub async fn set_device_disabled(
    gw: &Gateway,
    device_id: &str,
    disabled: bool,
    reason: Option<&str>,
) -> Result<Device, SyncError> {
    let patch = if disabled {
        let reason = reason.map(str::trim).unwrap_or_default();
        if reason.is_empty() {
            return Err(SyncError::validation("A reason is required to disable a device"));
        }
        json!({ "is_disabled": true, "disable_reason": reason })
    } else {
        json!({ "is_disabled": false, "disable_reason": null })
    };

    let device: Device = gw.update(device_id, &patch).await?;
    tracing::info!(
        device_id,
        device = %device.label(),
        disabled,
        "Device availability changed",
    );
    Ok(device)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    pub associations_deleted: usize,
    pub accounts_deleted: usize,
    pub device_deleted: bool,
    pub failures: Vec<ItemIssue<EntityId>>,
    pub refresh: RefreshReport,
}

/// Delete a device together with its associations and linked accounts.
///
/// The device row itself is only deleted when every dependent row went;
/// otherwise it stays so the operation can be re-run. Installed flags of
/// the affected apps are refreshed whatever happened to the device row.
pub async fn delete_device_cascade(gw: &Gateway, device_id: &str) -> Result<CascadeReport, SyncError> {
    let device: Device = gw.get(device_id).await?;
    let rows: Vec<Association> = gw
        .filter(&filter_by([("device_id", json!(device_id))]))
        .await?;
    let accounts: Vec<LinkedAccount> = gw
        .filter(&filter_by([("device_id", json!(device_id))]))
        .await?;

    let mut report = CascadeReport::default();
    let mut affected: BTreeSet<EntityId> = BTreeSet::new();

    for row in &rows {
        gw.pause().await;
        match gw.delete_if_present(ASSOCIATION_ENTITY, &row.id).await {
            Ok(_) => {
                report.associations_deleted += 1;
                affected.insert(row.app_id.clone());
            }
            Err(e) => {
                tracing::warn!(association_id = %row.id, error = %e, "Failed to delete association");
                report.failures.push(ItemIssue::new(row.id.clone(), e.to_string()));
            }
        }
    }

    for account in &accounts {
        gw.pause().await;
        match gw.delete_if_present(LINKED_ACCOUNT_ENTITY, &account.id).await {
            Ok(_) => report.accounts_deleted += 1,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Failed to delete linked account");
                report.failures.push(ItemIssue::new(account.id.clone(), e.to_string()));
            }
        }
    }

    if report.failures.is_empty() {
        gw.pause().await;
        match gw.delete_if_present(DEVICE_ENTITY, device_id).await {
            Ok(_) => report.device_deleted = true,
            Err(e) => {
                tracing::warn!(device_id, error = %e, "Failed to delete device");
                report.failures.push(ItemIssue::new(device_id.to_string(), e.to_string()));
            }
        }
    } else {
        tracing::warn!(
            device_id,
            failed = report.failures.len(),
            "Dependent rows remain; device kept",
        );
    }

    report.refresh = refresh_apps(gw, &affected).await;

    tracing::info!(
        device_id,
        device = %device.label(),
        associations_deleted = report.associations_deleted,
        accounts_deleted = report.accounts_deleted,
        device_deleted = report.device_deleted,
        "Device cascade delete finished",
    );
    Ok(report)
}

//! Device-side reconciliation: which apps one headset carries.

use std::collections::BTreeSet;

use serde_json::json;
use vrfleet_client::{filter_by, Gateway};
use vrfleet_core::association::{audit_rows, RelationIndex};
use vrfleet_core::directory::AppDirectory;
use vrfleet_core::models::{App, Association, Device};
use vrfleet_core::reconcile::plan_delta;
use vrfleet_core::types::EntityId;

use crate::error::SyncError;
use crate::installed::refresh_apps;
use crate::links::{delete_stale, link, unlink, LinkOutcome};
use crate::options::ReconcileOptions;
use crate::report::{ItemIssue, ReconcileReport};

/// Make the set of apps linked to `device_id` equal `selected`.
///
/// A disabled device keeps its existing links but gains no new ones.
pub async fn reconcile_device_apps(
    gw: &Gateway,
    device_id: &str,
    selected: &[EntityId],
    options: ReconcileOptions,
) -> Result<ReconcileReport<EntityId>, SyncError> {
    let device: Device = gw.get(device_id).await?;
    let apps = AppDirectory::new(gw.list::<App>().await?);
    let rows: Vec<Association> = gw
        .filter(&filter_by([("device_id", json!(device_id))]))
        .await?;

    let mut report = ReconcileReport::default();
    let mut affected: BTreeSet<EntityId> = BTreeSet::new();

    let audit = audit_rows(rows, |_| true, |id| apps.contains_id(id));
    if options.heal && !audit.stale.is_empty() {
        let deletion = delete_stale(gw, &audit.stale).await;
        report.healed = deletion.deleted;
        report.heal_failures = deletion.failures;
        affected.extend(audit.stale.iter().map(|s| s.row.app_id.clone()));
    }

    let mut index = RelationIndex::from_rows(&audit.kept);
    let current: BTreeSet<EntityId> = audit.kept.iter().map(|r| r.app_id.clone()).collect();
    let target: BTreeSet<EntityId> = selected.iter().cloned().collect();
    let delta = plan_delta(&target, &current);

    tracing::info!(
        device_id,
        binocular_number = device.binocular_number,
        current = current.len(),
        target = target.len(),
        to_add = delta.to_add.len(),
        to_remove = delta.to_remove.len(),
        "Reconciling device apps",
    );

    let mut first_call = true;
    for app_id in &delta.to_add {
        if !apps.contains_id(app_id) {
            tracing::warn!(device_id, app_id = %app_id, "Unknown app id");
            report
                .failures
                .push(ItemIssue::new(app_id.clone(), "unknown app id"));
            continue;
        }
        if device.is_disabled {
            report
                .skipped
                .push(ItemIssue::new(app_id.clone(), "device is disabled"));
            continue;
        }
        if !std::mem::take(&mut first_call) {
            gw.pause().await;
        }
        match link(gw, &mut index, device_id, app_id).await {
            Ok(LinkOutcome::Created(_)) => {
                report.added.push(app_id.clone());
                affected.insert(app_id.clone());
            }
            Ok(LinkOutcome::AlreadyLinked) => {}
            Err(e) => {
                tracing::warn!(device_id, app_id = %app_id, error = %e, "Failed to link app");
                report.failures.push(ItemIssue::new(app_id.clone(), e.to_string()));
            }
        }
    }

    for app_id in &delta.to_remove {
        if !std::mem::take(&mut first_call) {
            gw.pause().await;
        }
        match unlink(gw, &mut index, device_id, app_id).await {
            Ok(_) => {
                report.removed.push(app_id.clone());
                affected.insert(app_id.clone());
            }
            Err(e) => {
                tracing::warn!(device_id, app_id = %app_id, error = %e, "Failed to unlink app");
                report.failures.push(ItemIssue::new(app_id.clone(), e.to_string()));
            }
        }
    }

    if device.is_disabled && !report.skipped.is_empty() {
        tracing::info!(
            device_id,
            skipped = report.skipped.len(),
            "Device is disabled; new installs skipped",
        );
    }

    let refresh = refresh_apps(gw, &affected).await;
    for failure in refresh.failures {
        tracing::warn!(app_id = %failure.key, error = %failure.message, "Installed flag not refreshed");
    }

    tracing::info!(
        device_id,
        added = report.added.len(),
        removed = report.removed.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        healed = report.healed,
        heal_failed = report.heal_failures.len(),
        "Device apps reconciled",
    );
    Ok(report)
}

//! App-side reconciliation: which headsets carry one app.
//!
//! Keys are binocular numbers. The target is the operator's selection plus
//! the headset pinned by the navigation context; the current set comes
//! from the app's association rows joined against the live device list.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;
use vrfleet_client::{filter_by, Gateway};
use vrfleet_core::association::{audit_rows, RelationIndex};
use vrfleet_core::directory::DeviceDirectory;
use vrfleet_core::models::{App, Association, Device};
use vrfleet_core::navigation::PageContext;
use vrfleet_core::reconcile::{device_target, plan_delta};
use vrfleet_core::types::{BinocularNumber, EntityId};

use crate::error::SyncError;
use crate::installed::refresh_app_installed;
use crate::links::{delete_stale, link, unlink, LinkOutcome};
use crate::options::ReconcileOptions;
use crate::report::{ItemIssue, ReconcileReport};

/// Resolve the headset pinned by `ctx` to its binocular number.
pub async fn resolve_pinned(
    gw: &Gateway,
    ctx: &PageContext,
) -> Result<Option<BinocularNumber>, SyncError> {
    let Some(headset_id) = ctx.headset_id.as_deref() else {
        return Ok(None);
    };
    match gw.get::<Device>(headset_id).await {
        Ok(device) => Ok(Some(device.binocular_number)),
        Err(e) if e.is_not_found() => Err(SyncError::validation(format!(
            "Pinned headset {headset_id} does not exist"
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Make the set of headsets linked to `app_id` equal `selected ∪ pinned`.
pub async fn reconcile_app_devices(
    gw: &Gateway,
    app_id: &str,
    selected: &[BinocularNumber],
    pinned: Option<BinocularNumber>,
    options: ReconcileOptions,
) -> Result<ReconcileReport<BinocularNumber>, SyncError> {
    let app: App = gw.get(app_id).await?;
    let devices = DeviceDirectory::new(gw.list::<Device>().await?);
    let rows: Vec<Association> = gw.filter(&filter_by([("app_id", json!(app_id))])).await?;

    let mut report = ReconcileReport::default();

    // Rows are already scoped to this app; only the device side can dangle.
    let audit = audit_rows(rows, |id| devices.contains_id(id), |_| true);
    if options.heal && !audit.stale.is_empty() {
        let deletion = delete_stale(gw, &audit.stale).await;
        report.healed = deletion.deleted;
        report.heal_failures = deletion.failures;
    }

    let mut linked: BTreeMap<BinocularNumber, Vec<EntityId>> = BTreeMap::new();
    for row in &audit.kept {
        if let Some(number) = devices.number_of(&row.device_id) {
            linked.entry(number).or_default().push(row.device_id.clone());
        }
    }
    let mut index = RelationIndex::from_rows(&audit.kept);

    let current: BTreeSet<BinocularNumber> = linked.keys().copied().collect();
    let target = device_target(selected, pinned);
    let delta = plan_delta(&target, &current);

    tracing::info!(
        app_id,
        app = %app.name,
        current = current.len(),
        target = target.len(),
        to_add = delta.to_add.len(),
        to_remove = delta.to_remove.len(),
        "Reconciling app devices",
    );

    let mut first_call = true;
    for &number in &delta.to_add {
        let Some(device) = devices.by_number(number) else {
            tracing::warn!(app_id, binocular_number = number, "Unknown binocular number");
            report
                .failures
                .push(ItemIssue::new(number, "unknown binocular number"));
            continue;
        };
        if device.is_disabled {
            tracing::info!(app_id, binocular_number = number, "Skipping disabled device");
            report.skipped.push(ItemIssue::new(number, "device is disabled"));
            continue;
        }
        if !std::mem::take(&mut first_call) {
            gw.pause().await;
        }
        match link(gw, &mut index, &device.id, app_id).await {
            Ok(LinkOutcome::Created(_)) => report.added.push(number),
            Ok(LinkOutcome::AlreadyLinked) => {}
            Err(e) => {
                tracing::warn!(app_id, binocular_number = number, error = %e, "Failed to link device");
                report.failures.push(ItemIssue::new(number, e.to_string()));
            }
        }
    }

    for &number in &delta.to_remove {
        let device_ids = linked.get(&number).cloned().unwrap_or_default();
        let mut failed = false;
        for device_id in &device_ids {
            if !std::mem::take(&mut first_call) {
                gw.pause().await;
            }
            if let Err(e) = unlink(gw, &mut index, device_id, app_id).await {
                tracing::warn!(app_id, binocular_number = number, error = %e, "Failed to unlink device");
                report.failures.push(ItemIssue::new(number, e.to_string()));
                failed = true;
            }
        }
        if !failed {
            report.removed.push(number);
        }
    }

    match refresh_app_installed(gw, &app).await {
        Ok(installed) => report.is_installed = Some(installed),
        Err(e) => {
            tracing::warn!(app_id, error = %e, "Failed to refresh installed flag");
        }
    }

    tracing::info!(
        app_id,
        added = report.added.len(),
        removed = report.removed.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        healed = report.healed,
        heal_failed = report.heal_failures.len(),
        "App devices reconciled",
    );
    Ok(report)
}

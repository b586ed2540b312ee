//! Fleet-wide removal of orphan and duplicate association rows.

use serde::Serialize;
use vrfleet_client::Gateway;
use vrfleet_core::association::{audit_rows, StaleReason, StaleRow};
use vrfleet_core::directory::{AppDirectory, DeviceDirectory};
use vrfleet_core::models::{App, Association, Device};
use vrfleet_core::types::EntityId;

use crate::error::SyncError;
use crate::installed::refresh_all_installed;
use crate::links::delete_stale;
use crate::report::{ItemIssue, RefreshReport};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub missing_device: usize,
    pub missing_app: usize,
    pub duplicates: usize,
    /// Rows actually deleted; zero on a dry run.
    pub deleted: usize,
    /// Stale rows whose delete failed, keyed by association id.
    pub failures: Vec<ItemIssue<EntityId>>,
    pub dry_run: bool,
    pub refresh: Option<RefreshReport>,
}

impl CleanupReport {
    pub fn stale(&self) -> usize {
        self.missing_device + self.missing_app + self.duplicates
    }

    /// Some stale row or installed flag could not be fixed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
            || self
                .refresh
                .as_ref()
                .is_some_and(|refresh| !refresh.failures.is_empty())
    }
}

/// Delete association rows whose device or app is gone, and every row but
/// the first for each pair, then refresh all installed flags. A dry run
/// only counts.
pub async fn cleanup_associations(gw: &Gateway, dry_run: bool) -> Result<CleanupReport, SyncError> {
    let devices = DeviceDirectory::new(gw.list::<Device>().await?);
    let apps = AppDirectory::new(gw.list::<App>().await?);
    let rows: Vec<Association> = gw.list().await?;

    let mut report = CleanupReport {
        scanned: rows.len(),
        dry_run,
        ..Default::default()
    };

    let audit = audit_rows(rows, |id| devices.contains_id(id), |id| apps.contains_id(id));
    for StaleRow { reason, .. } in &audit.stale {
        match reason {
            StaleReason::MissingDevice => report.missing_device += 1,
            StaleReason::MissingApp => report.missing_app += 1,
            StaleReason::Duplicate => report.duplicates += 1,
        }
    }

    tracing::info!(
        scanned = report.scanned,
        missing_device = report.missing_device,
        missing_app = report.missing_app,
        duplicates = report.duplicates,
        dry_run,
        "Association audit complete",
    );

    if dry_run {
        for stale in &audit.stale {
            tracing::info!(
                association_id = %stale.row.id,
                reason = stale.reason.as_str(),
                "Would delete association",
            );
        }
        return Ok(report);
    }

    let deletion = delete_stale(gw, &audit.stale).await;
    report.deleted = deletion.deleted;
    report.failures = deletion.failures;
    report.refresh = Some(refresh_all_installed(gw).await?);
    Ok(report)
}

//! Keeps the derived `App.is_installed` flag in line with association rows.

use std::collections::BTreeSet;

use serde_json::json;
use vrfleet_client::{filter_by, ClientError, Gateway};
use vrfleet_core::association::count_by_app;
use vrfleet_core::models::{App, Association};
use vrfleet_core::types::EntityId;

use crate::error::SyncError;
use crate::report::{ItemIssue, RefreshReport};

/// Recount `app`'s associations and write the flag back when it drifted.
/// Returns the flag's final value.
pub async fn refresh_app_installed(gw: &Gateway, app: &App) -> Result<bool, ClientError> {
    let rows: Vec<Association> = gw.filter(&filter_by([("app_id", json!(app.id))])).await?;
    write_flag(gw, app, !rows.is_empty()).await?;
    Ok(!rows.is_empty())
}

/// Write `installed` to the app if it differs. Returns whether a write
/// happened.
async fn write_flag(gw: &Gateway, app: &App, installed: bool) -> Result<bool, ClientError> {
    if app.is_installed == installed {
        return Ok(false);
    }
    let _: App = gw
        .update(&app.id, &json!({ "is_installed": installed }))
        .await?;
    tracing::info!(app_id = %app.id, app = %app.name, is_installed = installed, "Updated installed flag");
    Ok(true)
}

/// Refresh the flag of each listed app. Apps that no longer exist are
/// ignored; other errors are recorded per app.
pub async fn refresh_apps(gw: &Gateway, app_ids: &BTreeSet<EntityId>) -> RefreshReport {
    let mut report = RefreshReport::default();
    for (i, app_id) in app_ids.iter().enumerate() {
        if i > 0 {
            gw.pause().await;
        }
        let app = match gw.get::<App>(app_id).await {
            Ok(app) => app,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                tracing::warn!(app_id = %app_id, error = %e, "Failed to load app for refresh");
                report.failures.push(ItemIssue::new(app_id.clone(), e.to_string()));
                continue;
            }
        };
        report.checked += 1;
        let before = app.is_installed;
        match refresh_app_installed(gw, &app).await {
            Ok(after) if after != before => report.updated.push(app_id.clone()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(app_id = %app_id, error = %e, "Failed to refresh installed flag");
                report.failures.push(ItemIssue::new(app_id.clone(), e.to_string()));
            }
        }
    }
    report
}

/// One pass over every app and association, rewriting drifted flags.
pub async fn refresh_all_installed(gw: &Gateway) -> Result<RefreshReport, SyncError> {
    let apps: Vec<App> = gw.list().await?;
    let rows: Vec<Association> = gw.list().await?;
    let counts = count_by_app(&rows);

    let mut report = RefreshReport::default();
    let mut wrote_previous = false;
    for app in &apps {
        report.checked += 1;
        let installed = counts.get(&app.id).copied().unwrap_or(0) > 0;
        if app.is_installed == installed {
            continue;
        }
        if wrote_previous {
            gw.pause().await;
        }
        wrote_previous = true;
        match write_flag(gw, app, installed).await {
            Ok(_) => report.updated.push(app.id.clone()),
            Err(e) => {
                tracing::warn!(app_id = %app.id, error = %e, "Failed to refresh installed flag");
                report.failures.push(ItemIssue::new(app.id.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        checked = report.checked,
        updated = report.updated.len(),
        failed = report.failures.len(),
        "Installed flags refreshed",
    );
    Ok(report)
}

//! User-extensible option catalogs (genres, platforms, ...).

use std::collections::HashSet;

use serde::Serialize;
use vrfleet_client::Gateway;
use vrfleet_core::models::{App, OptionCatalog, OptionDraft, OptionEntry};

use crate::error::SyncError;

pub async fn list_options(gw: &Gateway, catalog: OptionCatalog) -> Result<Vec<OptionEntry>, SyncError> {
    Ok(gw.list_in(catalog.entity_name()).await?)
}

/// Create an active option for each value not yet in the catalog
/// (case-insensitive). Returns the rows created.
pub async fn ensure_options(
    gw: &Gateway,
    catalog: OptionCatalog,
    values: &[String],
) -> Result<Vec<OptionEntry>, SyncError> {
    let existing = list_options(gw, catalog).await?;
    let mut known: HashSet<String> = existing.iter().map(|o| o.value.to_lowercase()).collect();

    let mut created = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() || !known.insert(value.to_lowercase()) {
            continue;
        }
        if !created.is_empty() {
            gw.pause().await;
        }
        let entry: OptionEntry = gw
            .create_in(catalog.entity_name(), &OptionDraft::from_value(value))
            .await?;
        tracing::info!(catalog = catalog.as_str(), value, "Created option");
        created.push(entry);
    }
    Ok(created)
}

/// Number of apps referencing an option value.
pub async fn option_usage(gw: &Gateway, catalog: OptionCatalog, value: &str) -> Result<usize, SyncError> {
    let apps: Vec<App> = gw.list().await?;
    Ok(apps.iter().filter(|app| catalog.app_uses(app, value)).count())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDeletion {
    pub value: String,
    /// Apps still referencing the deleted value.
    pub apps_affected: usize,
}

/// Delete a catalog option. Deleting affects every app globally, so the
/// caller must pass `confirmed`.
pub async fn delete_option(
    gw: &Gateway,
    catalog: OptionCatalog,
    option_id: &str,
    confirmed: bool,
) -> Result<OptionDeletion, SyncError> {
    if !confirmed {
        return Err(SyncError::validation(format!(
            "Deleting a {catalog} option affects all apps globally; confirmation required"
        )));
    }

    let entry = list_options(gw, catalog)
        .await?
        .into_iter()
        .find(|o| o.id == option_id)
        .ok_or_else(|| {
            SyncError::validation(format!("No {catalog} option with id {option_id}"))
        })?;

    let apps_affected = option_usage(gw, catalog, &entry.value).await?;
    gw.delete(catalog.entity_name(), option_id).await?;
    tracing::warn!(
        catalog = catalog.as_str(),
        value = %entry.value,
        apps_affected,
        "Deleted option",
    );

    Ok(OptionDeletion {
        value: entry.value,
        apps_affected,
    })
}

//! Versioned seed files that populate a whole fleet in one run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vrfleet_client::Gateway;
use vrfleet_core::import::{determine_status, AccountRow, AssociationRow, ImportMode};
use vrfleet_core::models::{AppDraft, DeviceDraft, ImportStatus};
use vrfleet_core::types::BinocularNumber;
use vrfleet_sync::installed::refresh_all_installed;
use vrfleet_sync::RefreshReport;

use crate::error::ImportError;
use crate::log::ImportLog;
use crate::upsert::{
    link_rows, numbered, upsert_accounts, upsert_apps, upsert_devices, PhaseOutcome,
    PhaseSettings, Row,
};

/// Seed file versions this loader understands.
pub const SUPPORTED_SEED_VERSIONS: &[u32] = &[1];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFile {
    pub version: u32,
    #[serde(default)]
    pub devices: Vec<DeviceDraft>,
    #[serde(default)]
    pub apps: Vec<AppDraft>,
    #[serde(default)]
    pub accounts: Vec<AccountRow>,
    #[serde(default)]
    pub installs: Vec<SeedInstall>,
}

/// Apps installed on one headset, by app name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedInstall {
    pub binocular_number: BinocularNumber,
    #[serde(default)]
    pub apps: Vec<String>,
}

impl SeedFile {
    /// Parse and validate a seed document.
    pub fn parse(content: &str) -> Result<Self, ImportError> {
        let seed: SeedFile = serde_json::from_str(content)
            .map_err(|e| ImportError::validation(format!("Invalid seed file: {e}")))?;
        seed.validate()?;
        Ok(seed)
    }

    pub async fn load(path: &Path) -> Result<Self, ImportError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ImportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if !SUPPORTED_SEED_VERSIONS.contains(&self.version) {
            return Err(ImportError::validation(format!(
                "Unsupported seed version {} (supported: {:?})",
                self.version, SUPPORTED_SEED_VERSIONS
            )));
        }
        if let Some(i) = self.apps.iter().position(|a| a.name.trim().is_empty()) {
            return Err(ImportError::validation(format!("apps[{i}]: name must not be empty")));
        }
        if let Some(i) = self.accounts.iter().position(|a| a.account_type.trim().is_empty()) {
            return Err(ImportError::validation(format!(
                "accounts[{i}]: account_type must not be empty"
            )));
        }
        Ok(())
    }

    /// Flatten `installs` into one association row per app name.
    pub fn association_rows(&self) -> Vec<AssociationRow> {
        self.installs
            .iter()
            .flat_map(|install| {
                install.apps.iter().map(|name| AssociationRow {
                    binocular_number: install.binocular_number,
                    app_name: name.clone(),
                    status: None,
                    installation_date: None,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub status: ImportStatus,
    pub devices: PhaseOutcome,
    pub apps: PhaseOutcome,
    pub accounts: PhaseOutcome,
    pub associations: PhaseOutcome,
    pub refresh: RefreshReport,
    pub log: ImportLog,
}

impl SeedSummary {
    pub fn total(&self) -> PhaseOutcome {
        let mut total = PhaseOutcome::default();
        for phase in [self.devices, self.apps, self.accounts, self.associations] {
            total.absorb(phase);
        }
        total
    }
}

/// Apply a seed file: devices, apps, accounts, associations, then a full
/// `is_installed` refresh.
///
/// `replace` is refused: a seed only ever adds to or updates a fleet.
pub async fn run_seed(
    gw: &Gateway,
    seed: &SeedFile,
    settings: PhaseSettings,
) -> Result<SeedSummary, ImportError> {
    seed.validate()?;
    if settings.mode == ImportMode::Replace {
        return Err(ImportError::validation("Seed files cannot run in replace mode"));
    }

    let mut log = ImportLog::new();
    log.info(format!(
        "Seeding v{}: {} devices, {} apps, {} accounts, {} installs",
        seed.version,
        seed.devices.len(),
        seed.apps.len(),
        seed.accounts.len(),
        seed.installs.len()
    ));

    let devices = upsert_devices(gw, numbered(seed.devices.iter().cloned()), settings, &mut log).await?;
    let apps = upsert_apps(gw, numbered(seed.apps.iter().cloned()), settings, &mut log).await?;
    let accounts =
        upsert_accounts(gw, numbered(seed.accounts.iter().cloned()), settings, &mut log).await?;
    let links: Vec<Row<AssociationRow>> = numbered(seed.association_rows());
    let associations = link_rows(gw, links, &mut log).await?.outcome;

    let refresh = refresh_all_installed(gw).await?;
    log.info(format!(
        "Installed flags: {} checked, {} updated",
        refresh.checked,
        refresh.updated.len()
    ));

    let mut summary = SeedSummary {
        status: ImportStatus::Success,
        devices,
        apps,
        accounts,
        associations,
        refresh,
        log,
    };
    let total = summary.total();
    summary.status = determine_status(total.applied(), total.failed);
    summary.log.info(format!("Seed finished with status {}: {total}", summary.status));
    Ok(summary)
}

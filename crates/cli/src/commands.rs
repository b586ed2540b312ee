//! `vrfleet` subcommands and their dispatch onto the sync and import crates.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use vrfleet_client::{ClientError, Gateway};
use vrfleet_core::error::CoreError;
use vrfleet_core::import::{DataType, ImportMode};
use vrfleet_core::import_format::ColumnMapping;
use vrfleet_core::models::{Credentials, ImportStatus, OptionCatalog};
use vrfleet_core::navigation::PageContext;
use vrfleet_core::types::{BinocularNumber, EntityId};
use vrfleet_import::{import_file, run_seed, ImportError, PhaseSettings, SeedFile};
use vrfleet_sync::accounts::{upsert_linked_account, AccountAction};
use vrfleet_sync::app_devices::{reconcile_app_devices, resolve_pinned};
use vrfleet_sync::catalog::{delete_option, ensure_options, list_options};
use vrfleet_sync::cleanup::{cleanup_associations, CleanupReport};
use vrfleet_sync::device_apps::reconcile_device_apps;
use vrfleet_sync::devices::{delete_device_cascade, set_device_disabled};
use vrfleet_sync::installed::refresh_all_installed;
use vrfleet_sync::{ReconcileOptions, SyncError};

#[derive(Debug, Parser)]
#[command(name = "vrfleet", about = "Manage a VR headset fleet and its installed apps", version)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the headsets an app is installed on
    ReconcileApp {
        /// App id
        app_id: EntityId,
        /// Binocular numbers, comma separated
        #[arg(long, value_delimiter = ',')]
        devices: Vec<BinocularNumber>,
        /// Page context query string; `headsetId` pins a headset
        #[arg(long, value_name = "query")]
        context: Option<String>,
        #[command(flatten)]
        heal: HealArgs,
    },

    /// Set the apps installed on a headset
    ReconcileDevice {
        /// Device id
        device_id: EntityId,
        /// App ids, comma separated
        #[arg(long, value_delimiter = ',')]
        apps: Vec<EntityId>,
        #[command(flatten)]
        heal: HealArgs,
    },

    /// Import a CSV or JSON file
    Import {
        /// File to import (`.csv` or `.json`)
        path: PathBuf,
        /// devices, apps, linked_accounts or associations
        #[arg(long = "type", value_parser = parse_data_type)]
        data_type: DataType,
        #[arg(long, default_value = "upsert", value_parser = parse_mode)]
        mode: ImportMode,
        /// Column mapping entries
        #[arg(long = "map", value_name = "column=field")]
        map: Vec<String>,
        /// Create new rows with a single bulk call
        #[arg(long)]
        bulk: bool,
    },

    /// Load a versioned seed file
    Seed {
        path: PathBuf,
        #[arg(long, default_value = "upsert", value_parser = parse_mode)]
        mode: ImportMode,
        #[arg(long)]
        bulk: bool,
    },

    /// Delete orphan and duplicate associations
    Cleanup {
        /// Only count what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Rewrite drifted `is_installed` flags
    RefreshInstalled,

    /// Take a headset out of rotation
    DisableDevice {
        device_id: EntityId,
        #[arg(long)]
        reason: String,
    },

    /// Put a headset back into rotation
    EnableDevice { device_id: EntityId },

    /// Delete a headset with its associations and linked accounts
    DeleteDevice {
        device_id: EntityId,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Create or update a headset's linked account
    SetAccount {
        device_id: EntityId,
        #[arg(long = "type")]
        account_type: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Manage option catalogs
    Options {
        #[command(subcommand)]
        action: OptionsCommand,
    },
}

#[derive(Debug, Args)]
pub struct HealArgs {
    /// Leave orphan and duplicate rows in place
    #[arg(long)]
    no_heal: bool,
}

impl HealArgs {
    fn options(&self) -> ReconcileOptions {
        ReconcileOptions { heal: !self.no_heal }
    }
}

#[derive(Debug, Subcommand)]
pub enum OptionsCommand {
    /// List a catalog
    List {
        #[arg(value_parser = parse_catalog)]
        catalog: OptionCatalog,
    },
    /// Create missing values
    Ensure {
        #[arg(value_parser = parse_catalog)]
        catalog: OptionCatalog,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Delete an option (affects every app)
    Delete {
        #[arg(value_parser = parse_catalog)]
        catalog: OptionCatalog,
        option_id: EntityId,
        #[arg(long)]
        yes: bool,
    },
}

fn parse_data_type(s: &str) -> Result<DataType, String> {
    DataType::parse(s)
        .ok_or_else(|| format!("unknown data type '{s}' (devices, apps, linked_accounts, associations)"))
}

fn parse_mode(s: &str) -> Result<ImportMode, String> {
    ImportMode::parse(s).ok_or_else(|| format!("unknown mode '{s}' (add-only, upsert, replace)"))
}

fn parse_catalog(s: &str) -> Result<OptionCatalog, String> {
    OptionCatalog::parse(s).ok_or_else(|| {
        let known: Vec<&str> = OptionCatalog::ALL.iter().map(OptionCatalog::as_str).collect();
        format!("unknown catalog '{s}' ({})", known.join(", "))
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

/// How a command that did not error finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Complete,
    /// Some items failed; the rest were applied.
    Partial,
    /// Nothing could be applied.
    Failed,
}

impl Completion {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Complete => 0,
            Self::Failed => 1,
            Self::Partial => 2,
        }
    }

    fn from_status(status: ImportStatus) -> Self {
        match status {
            ImportStatus::Success => Self::Complete,
            ImportStatus::Partial => Self::Partial,
            ImportStatus::Failure => Self::Failed,
        }
    }

    fn from_failures(failures: usize) -> Self {
        Self::from_partial(failures > 0)
    }

    fn from_partial(partial: bool) -> Self {
        if partial {
            Self::Partial
        } else {
            Self::Complete
        }
    }

    fn from_cleanup(report: &CleanupReport) -> Self {
        if !report.failures.is_empty() && report.deleted == 0 {
            Self::Failed
        } else {
            Self::from_partial(report.is_partial())
        }
    }
}

/// Run one command and print its report as JSON on stdout.
pub async fn run(gw: &Gateway, command: Command) -> Result<Completion, CommandError> {
    match command {
        Command::ReconcileApp {
            app_id,
            devices,
            context,
            heal,
        } => {
            let ctx = PageContext::from_query(context.as_deref().unwrap_or_default());
            let pinned = resolve_pinned(gw, &ctx).await?;
            let report = reconcile_app_devices(gw, &app_id, &devices, pinned, heal.options()).await?;
            print(&report)?;
            if let Some(url) = ctx.return_url() {
                tracing::info!(return_url = %url, "Reconcile saved");
            }
            Ok(Completion::from_partial(report.is_partial()))
        }
        Command::ReconcileDevice {
            device_id,
            apps,
            heal,
        } => {
            let report = reconcile_device_apps(gw, &device_id, &apps, heal.options()).await?;
            print(&report)?;
            Ok(Completion::from_partial(report.is_partial()))
        }
        Command::Import {
            path,
            data_type,
            mode,
            map,
            bulk,
        } => {
            let mapping = ColumnMapping::parse_pairs(map.iter().map(String::as_str))?;
            let summary = import_file(gw, &path, data_type, mode, mapping, bulk).await?;
            print(&summary)?;
            Ok(Completion::from_status(summary.status))
        }
        Command::Seed { path, mode, bulk } => {
            let seed = SeedFile::load(&path).await?;
            let summary = run_seed(gw, &seed, PhaseSettings { mode, use_bulk: bulk }).await?;
            print(&summary)?;
            Ok(Completion::from_status(summary.status))
        }
        Command::Cleanup { dry_run } => {
            let report = cleanup_associations(gw, dry_run).await?;
            print(&report)?;
            Ok(Completion::from_cleanup(&report))
        }
        Command::RefreshInstalled => {
            let report = refresh_all_installed(gw).await?;
            print(&report)?;
            Ok(Completion::from_failures(report.failures.len()))
        }
        Command::DisableDevice { device_id, reason } => {
            let device = set_device_disabled(gw, &device_id, true, Some(&reason)).await?;
            print(&device)?;
            Ok(Completion::Complete)
        }
        Command::EnableDevice { device_id } => {
            let device = set_device_disabled(gw, &device_id, false, None).await?;
            print(&device)?;
            Ok(Completion::Complete)
        }
        Command::DeleteDevice { device_id, yes } => {
            if !yes {
                return Err(CoreError::Validation(format!(
                    "Deleting device {device_id} also deletes its associations and accounts; pass --yes to confirm"
                ))
                .into());
            }
            let report = delete_device_cascade(gw, &device_id).await?;
            print(&report)?;
            Ok(Completion::from_failures(report.failures.len()))
        }
        Command::SetAccount {
            device_id,
            account_type,
            email,
            username,
            password,
        } => {
            let credentials = Credentials {
                email,
                username,
                password,
            };
            let outcome = upsert_linked_account(gw, &device_id, &account_type, &credentials).await?;
            print(&AccountView {
                account_id: &outcome.account_id,
                action: match outcome.action {
                    AccountAction::Created => "created",
                    AccountAction::Updated => "updated",
                    AccountAction::Unchanged => "unchanged",
                },
                duplicates_removed: outcome.duplicates_removed,
            })?;
            Ok(Completion::Complete)
        }
        Command::Options { action } => run_options(gw, action).await,
    }
}

async fn run_options(gw: &Gateway, action: OptionsCommand) -> Result<Completion, CommandError> {
    match action {
        OptionsCommand::List { catalog } => {
            print(&list_options(gw, catalog).await?)?;
        }
        OptionsCommand::Ensure { catalog, values } => {
            print(&ensure_options(gw, catalog, &values).await?)?;
        }
        OptionsCommand::Delete {
            catalog,
            option_id,
            yes,
        } => {
            print(&delete_option(gw, catalog, &option_id, yes).await?)?;
        }
    }
    Ok(Completion::Complete)
}

#[derive(Serialize)]
struct AccountView<'a> {
    account_id: &'a str,
    action: &'static str,
    duplicates_removed: usize,
}

fn print<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

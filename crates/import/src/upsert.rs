//! Per-entity import phases shared by data imports and seed files.
//!
//! Each phase loads the existing rows once, builds its lookup, partitions
//! the input into creates and updates, and then executes them as a paced,
//! sequential batch through the gateway. Row-level failures are logged and
//! counted; only a failure to load the existing rows aborts a phase.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;
use vrfleet_client::Gateway;
use vrfleet_core::association::{AssociationKey, RelationIndex};
use vrfleet_core::directory::{AppDirectory, DeviceDirectory};
use vrfleet_core::import::{AccountRow, AssociationRow, ImportMode};
use vrfleet_core::models::{
    app_name_key, App, AppDraft, Association, AssociationDraft, Device, DeviceDraft, Entity,
    LinkedAccount,
};
use vrfleet_core::types::EntityId;
use vrfleet_sync::accounts::{upsert_linked_account, AccountAction};

use crate::error::ImportError;
use crate::log::ImportLog;

/// One input item with its 1-based row number.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<T> {
    pub number: usize,
    pub item: T,
}

impl<T> Row<T> {
    pub fn new(number: usize, item: T) -> Self {
        Self { number, item }
    }
}

/// Number all items starting at 1.
pub fn numbered<T>(items: impl IntoIterator<Item = T>) -> Vec<Row<T>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Row::new(i + 1, item))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PhaseOutcome {
    /// Rows that changed the backend.
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }

    pub fn absorb(&mut self, other: PhaseOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} failed",
            self.created, self.updated, self.skipped, self.failed
        )
    }
}

/// Settings shared by every phase of one run.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSettings {
    pub mode: ImportMode,
    /// Send creates as one `bulk_create` call instead of one call per row.
    pub use_bulk: bool,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            mode: ImportMode::Upsert,
            use_bulk: false,
        }
    }
}

struct PendingUpdate {
    number: usize,
    label: String,
    id: EntityId,
    patch: Value,
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

pub async fn upsert_devices(
    gw: &Gateway,
    rows: Vec<Row<DeviceDraft>>,
    settings: PhaseSettings,
    log: &mut ImportLog,
) -> Result<PhaseOutcome, ImportError> {
    let directory = DeviceDirectory::new(gw.list::<Device>().await?);
    let mut outcome = PhaseOutcome::default();
    let mut creates = Vec::new();
    let mut updates = Vec::new();
    let mut seen = HashSet::new();

    for row in rows {
        let number = row.item.binocular_number;
        if !seen.insert(number) {
            log.warn(format!("Row {}: binocular #{number} repeated; skipped", row.number));
            outcome.skipped += 1;
            continue;
        }
        match directory.by_number(number) {
            None => creates.push(row),
            Some(_) if !settings.mode.updates_existing() => outcome.skipped += 1,
            Some(existing) => match row.item.changes_from(existing) {
                Some(patch) => updates.push(PendingUpdate {
                    number: row.number,
                    label: format!("binocular #{number}"),
                    id: existing.id.clone(),
                    patch,
                }),
                None => outcome.skipped += 1,
            },
        }
    }

    create_rows::<Device, _>(gw, creates, settings.use_bulk, log, &mut outcome, |d: &DeviceDraft| {
        format!("binocular #{}", d.binocular_number)
    })
    .await;
    apply_updates::<Device>(gw, updates, log, &mut outcome).await;

    log.info(format!("Devices: {outcome}"));
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Apps
// ---------------------------------------------------------------------------

pub async fn upsert_apps(
    gw: &Gateway,
    rows: Vec<Row<AppDraft>>,
    settings: PhaseSettings,
    log: &mut ImportLog,
) -> Result<PhaseOutcome, ImportError> {
    let directory = AppDirectory::new(gw.list::<App>().await?);
    let mut outcome = PhaseOutcome::default();
    let mut creates = Vec::new();
    let mut updates = Vec::new();
    let mut seen = HashSet::new();

    for row in rows {
        if !seen.insert(app_name_key(&row.item.name)) {
            log.warn(format!("Row {}: app \"{}\" repeated; skipped", row.number, row.item.name));
            outcome.skipped += 1;
            continue;
        }
        match directory.by_name(&row.item.name) {
            None => creates.push(row),
            Some(_) if !settings.mode.updates_existing() => outcome.skipped += 1,
            Some(existing) => match row.item.changes_from(existing) {
                Some(patch) => updates.push(PendingUpdate {
                    number: row.number,
                    label: format!("app \"{}\"", existing.name),
                    id: existing.id.clone(),
                    patch,
                }),
                None => outcome.skipped += 1,
            },
        }
    }

    create_rows::<App, _>(gw, creates, settings.use_bulk, log, &mut outcome, |a: &AppDraft| {
        format!("app \"{}\"", a.name)
    })
    .await;
    apply_updates::<App>(gw, updates, log, &mut outcome).await;

    log.info(format!("Apps: {outcome}"));
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Linked accounts
// ---------------------------------------------------------------------------

/// Accounts go through the linked-account upsert one row at a time, so
/// `use_bulk` does not apply here.
pub async fn upsert_accounts(
    gw: &Gateway,
    rows: Vec<Row<AccountRow>>,
    settings: PhaseSettings,
    log: &mut ImportLog,
) -> Result<PhaseOutcome, ImportError> {
    let devices = DeviceDirectory::new(gw.list::<Device>().await?);
    let existing: HashSet<(EntityId, String)> = gw
        .list::<LinkedAccount>()
        .await?
        .into_iter()
        .map(|a| (a.device_id, a.account_type))
        .collect();
    let mut outcome = PhaseOutcome::default();
    let mut seen = HashSet::new();

    for (i, row) in rows.into_iter().enumerate() {
        let AccountRow {
            binocular_number,
            account_type,
            credentials,
        } = row.item;
        let Some(device) = devices.by_number(binocular_number) else {
            log.error(format!("Row {}: unknown binocular number {binocular_number}", row.number));
            outcome.failed += 1;
            continue;
        };
        let key = (device.id.clone(), account_type.trim().to_string());
        if !seen.insert(key.clone()) {
            log.warn(format!(
                "Row {}: {} account for binocular #{binocular_number} repeated; skipped",
                row.number, key.1
            ));
            outcome.skipped += 1;
            continue;
        }
        if !settings.mode.updates_existing() && existing.contains(&key) {
            outcome.skipped += 1;
            continue;
        }

        if i > 0 {
            gw.pause().await;
        }
        match upsert_linked_account(gw, &device.id, &account_type, &credentials).await {
            Ok(result) => match result.action {
                AccountAction::Created => outcome.created += 1,
                AccountAction::Updated => outcome.updated += 1,
                AccountAction::Unchanged => outcome.skipped += 1,
            },
            Err(e) => {
                log.error(format!(
                    "Row {}: {account_type} account for binocular #{binocular_number}: {e}",
                    row.number
                ));
                outcome.failed += 1;
            }
        }
    }

    log.info(format!("Linked accounts: {outcome}"));
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------------

/// Result of the association phase, with the apps whose rows changed.
#[derive(Debug, Clone, Default)]
pub struct LinkPhase {
    pub outcome: PhaseOutcome,
    pub affected_apps: BTreeSet<EntityId>,
}

/// Create association rows addressed by binocular number and app name.
///
/// Pairs already linked are skipped. Association rows carry no fields
/// worth updating, so every mode behaves like add-only here; `replace`
/// is handled by clearing the collection beforehand.
pub async fn link_rows(
    gw: &Gateway,
    rows: Vec<Row<AssociationRow>>,
    log: &mut ImportLog,
) -> Result<LinkPhase, ImportError> {
    let devices = DeviceDirectory::new(gw.list::<Device>().await?);
    let apps = AppDirectory::new(gw.list::<App>().await?);
    let mut index = RelationIndex::from_rows(&gw.list::<Association>().await?);
    let mut phase = LinkPhase::default();
    let mut calls = 0usize;

    for row in rows {
        let AssociationRow {
            binocular_number,
            app_name,
            status,
            installation_date,
        } = row.item;
        let Some(device) = devices.by_number(binocular_number) else {
            log.error(format!("Row {}: unknown binocular number {binocular_number}", row.number));
            phase.outcome.failed += 1;
            continue;
        };
        let Some(app) = apps.by_name(&app_name) else {
            log.error(format!("Row {}: unknown app \"{app_name}\"", row.number));
            phase.outcome.failed += 1;
            continue;
        };
        if device.is_disabled {
            log.warn(format!(
                "Row {}: binocular #{binocular_number} is disabled; \"{}\" not linked",
                row.number, app.name
            ));
            phase.outcome.skipped += 1;
            continue;
        }
        let key = AssociationKey::new(device.id.as_str(), app.id.as_str());
        if index.contains(&key) {
            phase.outcome.skipped += 1;
            continue;
        }

        let mut draft = AssociationDraft::installed_today(&device.id, &app.id);
        if status.is_some() {
            draft.status = status;
        }
        if installation_date.is_some() {
            draft.installation_date = installation_date;
        }

        if calls > 0 {
            gw.pause().await;
        }
        calls += 1;
        match gw.create::<Association, _>(&draft).await {
            Ok(_) => {
                index.insert(key);
                phase.affected_apps.insert(app.id.clone());
                phase.outcome.created += 1;
            }
            Err(e) => {
                log.error(format!(
                    "Row {}: linking \"{}\" to binocular #{binocular_number}: {e}",
                    row.number, app.name
                ));
                phase.outcome.failed += 1;
            }
        }
    }

    log.info(format!("Associations: {}", phase.outcome));
    Ok(phase)
}

// ---------------------------------------------------------------------------
// Replace mode
// ---------------------------------------------------------------------------

/// Delete every row of `entity` one at a time. Rows already gone count as
/// deleted; other failures are logged. Returns `(deleted, failed)`.
pub async fn clear_entity(
    gw: &Gateway,
    entity: &str,
    log: &mut ImportLog,
) -> Result<(usize, usize), ImportError> {
    let rows: Vec<Value> = gw.list_in(entity).await?;
    let (mut deleted, mut failed) = (0, 0);

    for (i, row) in rows.iter().enumerate() {
        let Some(id) = row.get("id").and_then(Value::as_str) else {
            log.warn(format!("{entity} row without id left in place"));
            continue;
        };
        if i > 0 {
            gw.pause().await;
        }
        match gw.delete_if_present(entity, id).await {
            Ok(_) => deleted += 1,
            Err(e) => {
                log.error(format!("Could not delete {entity} {id}: {e}"));
                failed += 1;
            }
        }
    }

    log.info(format!("Replace: deleted {deleted} of {} {entity} rows", rows.len()));
    Ok((deleted, failed))
}

// ---- private helpers ----

async fn create_rows<T, D>(
    gw: &Gateway,
    rows: Vec<Row<D>>,
    use_bulk: bool,
    log: &mut ImportLog,
    outcome: &mut PhaseOutcome,
    label: impl Fn(&D) -> String,
) where
    T: Entity,
    D: Serialize,
{
    if rows.is_empty() {
        return;
    }

    if use_bulk {
        let first = rows[0].number;
        let drafts: Vec<&D> = rows.iter().map(|r| &r.item).collect();
        match gw.bulk_create::<T, _>(&drafts).await {
            Ok(created) => outcome.created += created.len(),
            Err(e) => {
                let last = rows[rows.len() - 1].number;
                log.error(format!("Rows {first}-{last}: bulk create of {} failed: {e}", T::NAME));
                outcome.failed += rows.len();
            }
        }
        return;
    }

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            gw.pause().await;
        }
        match gw.create::<T, _>(&row.item).await {
            Ok(_) => outcome.created += 1,
            Err(e) => {
                log.error(format!("Row {}: creating {}: {e}", row.number, label(&row.item)));
                outcome.failed += 1;
            }
        }
    }
}

async fn apply_updates<T: Entity>(
    gw: &Gateway,
    updates: Vec<PendingUpdate>,
    log: &mut ImportLog,
    outcome: &mut PhaseOutcome,
) {
    for update in updates {
        gw.pause().await;
        match gw.update::<T>(&update.id, &update.patch).await {
            Ok(_) => outcome.updated += 1,
            Err(e) => {
                log.error(format!("Row {}: updating {}: {e}", update.number, update.label));
                outcome.failed += 1;
            }
        }
    }
}

//! CSV / JSON data import with a column mapping.
//!
//! A run parses the file, converts every mapped row for the chosen data
//! type, runs the matching phase and records the outcome as an `ImportJob`.

use std::path::Path;

use serde::Serialize;
use serde_json::json;
use vrfleet_client::Gateway;
use vrfleet_core::error::CoreError;
use vrfleet_core::import::{
    account_from_row, app_from_row, association_from_row, determine_status, device_from_row,
    DataType, ImportMode,
};
use vrfleet_core::import_format::{parse_rows, ColumnMapping, ImportFormat, RawRow};
use vrfleet_core::models::{ImportJob, ImportJobDraft, ImportStatus};
use vrfleet_core::types::EntityId;
use vrfleet_sync::installed::{refresh_all_installed, refresh_apps};

use crate::error::ImportError;
use crate::log::ImportLog;
use crate::upsert::{
    clear_entity, link_rows, upsert_accounts, upsert_apps, upsert_devices, PhaseOutcome,
    PhaseSettings, Row,
};

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub file_name: String,
    pub content: String,
    pub data_type: DataType,
    pub mode: ImportMode,
    pub mapping: ColumnMapping,
    pub use_bulk: bool,
}

impl ImportRequest {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>, data_type: DataType) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            data_type,
            mode: ImportMode::Upsert,
            mapping: ColumnMapping::new(),
            use_bulk: false,
        }
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_bulk(mut self, use_bulk: bool) -> Self {
        self.use_bulk = use_bulk;
        self
    }

    /// Options recorded on the job row.
    fn job_options(&self) -> serde_json::Value {
        json!({
            "mode": self.mode.as_str(),
            "mapping": self.mapping,
            "use_bulk": self.use_bulk,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub status: ImportStatus,
    pub total_rows: usize,
    /// Rows rejected before reaching the backend.
    pub invalid_rows: usize,
    pub outcome: PhaseOutcome,
    pub deleted: usize,
    pub log: ImportLog,
    /// Id of the persisted job row, when recording it succeeded.
    pub job_id: Option<EntityId>,
}

impl ImportSummary {
    pub fn failed(&self) -> usize {
        self.invalid_rows + self.outcome.failed
    }
}

/// Read `path` and import it. The file name decides the format.
pub async fn import_file(
    gw: &Gateway,
    path: &Path,
    data_type: DataType,
    mode: ImportMode,
    mapping: ColumnMapping,
    use_bulk: bool,
) -> Result<ImportSummary, ImportError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let request = ImportRequest::new(file_name, content, data_type)
        .with_mode(mode)
        .with_mapping(mapping)
        .with_bulk(use_bulk);
    run_import(gw, &request).await
}

/// Run one import and persist its `ImportJob`.
///
/// Row-level problems never abort the run; they end up in the log and in
/// the final status. A file that cannot be parsed at all is a `failure`, and
/// so is a run cut short by the backend before anything was applied. The
/// job row is written in every case.
pub async fn run_import(gw: &Gateway, request: &ImportRequest) -> Result<ImportSummary, ImportError> {
    let mut log = ImportLog::new();
    log.info(format!(
        "Importing {} from {} ({} mode)",
        request.data_type, request.file_name, request.mode
    ));

    let rows = match read_rows(request) {
        Ok(rows) => rows,
        Err(e) => {
            log.error(format!("Could not parse {}: {e}", request.file_name));
            let mut summary = ImportSummary {
                status: ImportStatus::Failure,
                total_rows: 0,
                invalid_rows: 0,
                outcome: PhaseOutcome::default(),
                deleted: 0,
                log,
                job_id: None,
            };
            summary.job_id = record_job(gw, request, &summary).await;
            return Ok(summary);
        }
    };
    log.info(format!("Parsed {} rows", rows.len()));

    let mut summary = ImportSummary {
        status: ImportStatus::Success,
        total_rows: rows.len(),
        invalid_rows: 0,
        outcome: PhaseOutcome::default(),
        deleted: 0,
        log,
        job_id: None,
    };

    match apply_rows(gw, request, &rows, &mut summary).await {
        Ok(()) => {
            summary.status = determine_status(summary.outcome.applied(), summary.failed());
        }
        Err(e) => {
            summary.log.error(format!("Import aborted: {e}"));
            summary.status = if summary.outcome.applied() > 0 {
                ImportStatus::Partial
            } else {
                ImportStatus::Failure
            };
        }
    }
    summary.log.info(format!(
        "Finished with status {}: {} applied, {} skipped, {} failed",
        summary.status,
        summary.outcome.applied(),
        summary.outcome.skipped,
        summary.failed()
    ));

    summary.job_id = record_job(gw, request, &summary).await;
    Ok(summary)
}

// ---- private helpers ----

/// Clear the collection in replace mode, then run the phase for the data
/// type. Counts land in `summary` as they are produced.
async fn apply_rows(
    gw: &Gateway,
    request: &ImportRequest,
    rows: &[RawRow],
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let settings = PhaseSettings {
        mode: request.mode,
        use_bulk: request.use_bulk,
    };

    if request.mode == ImportMode::Replace {
        let (deleted, failed) =
            clear_entity(gw, request.data_type.entity_name(), &mut summary.log).await?;
        summary.deleted = deleted;
        summary.outcome.failed += failed;
    }

    match request.data_type {
        DataType::Devices => {
            let drafts = convert(rows, device_from_row, summary);
            let outcome = upsert_devices(gw, drafts, settings, &mut summary.log).await?;
            summary.outcome.absorb(outcome);
        }
        DataType::Apps => {
            let drafts = convert(rows, app_from_row, summary);
            let outcome = upsert_apps(gw, drafts, settings, &mut summary.log).await?;
            summary.outcome.absorb(outcome);
        }
        DataType::LinkedAccounts => {
            let drafts = convert(rows, account_from_row, summary);
            let outcome = upsert_accounts(gw, drafts, settings, &mut summary.log).await?;
            summary.outcome.absorb(outcome);
        }
        DataType::Associations => {
            let drafts = convert(rows, association_from_row, summary);
            let phase = link_rows(gw, drafts, &mut summary.log).await?;
            summary.outcome.absorb(phase.outcome);
            let refresh = if request.mode == ImportMode::Replace {
                refresh_all_installed(gw).await?
            } else {
                refresh_apps(gw, &phase.affected_apps).await
            };
            summary
                .log
                .info(format!("Installed flags: {} updated", refresh.updated.len()));
        }
    }
    Ok(())
}

fn read_rows(request: &ImportRequest) -> Result<Vec<RawRow>, CoreError> {
    let format = ImportFormat::from_file_name(&request.file_name).ok_or_else(|| {
        CoreError::Validation(format!("unsupported file type: {}", request.file_name))
    })?;
    let rows = parse_rows(format, &request.content)?;
    Ok(rows.iter().map(|row| request.mapping.apply(row)).collect())
}

/// Convert raw rows, logging and counting the invalid ones.
fn convert<T>(
    rows: &[RawRow],
    from_row: fn(&RawRow) -> Result<T, CoreError>,
    summary: &mut ImportSummary,
) -> Vec<Row<T>> {
    let mut converted = Vec::with_capacity(rows.len());
    for (i, raw) in rows.iter().enumerate() {
        match from_row(raw) {
            Ok(item) => converted.push(Row::new(i + 1, item)),
            Err(CoreError::Validation(msg)) => {
                summary.log.error(format!("Row {}: {msg}", i + 1));
                summary.invalid_rows += 1;
            }
            Err(e) => {
                summary.log.error(format!("Row {}: {e}", i + 1));
                summary.invalid_rows += 1;
            }
        }
    }
    converted
}

async fn record_job(gw: &Gateway, request: &ImportRequest, summary: &ImportSummary) -> Option<EntityId> {
    let draft = ImportJobDraft {
        file_name: request.file_name.clone(),
        data_type: request.data_type.as_str().to_string(),
        status: summary.status,
        options: request.job_options(),
        error_log: summary.log.error_text(),
    };
    match gw.create::<ImportJob, _>(&draft).await {
        Ok(job) => {
            tracing::info!(job_id = %job.id, status = %job.status, "Recorded import job");
            Some(job.id)
        }
        Err(e) => {
            tracing::warn!(error = %e, file_name = %request.file_name, "Failed to record import job");
            None
        }
    }
}

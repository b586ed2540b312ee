//! Core types and pure row conversion for bulk imports.
//!
//! No I/O here. Rows come from [`crate::import_format`] already mapped to
//! field names; this module validates them into create DTOs and decides
//! the final import status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::import_format::RawRow;
use crate::models::{
    AppDraft, Credentials, DeviceDraft, ImportStatus, APP_ENTITY, ASSOCIATION_ENTITY,
    DEVICE_ENTITY, LINKED_ACCOUNT_ENTITY,
};
use crate::types::BinocularNumber;

/// Separators accepted inside list-valued text cells.
const LIST_SEPARATORS: &[char] = &[';', '|'];

// ---------------------------------------------------------------------------
// Data type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Devices,
    Apps,
    LinkedAccounts,
    Associations,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::Apps => "apps",
            Self::LinkedAccounts => "linked_accounts",
            Self::Associations => "associations",
        }
    }

    /// Parse a data type name. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "devices" | "device" => Some(Self::Devices),
            "apps" | "app" => Some(Self::Apps),
            "linked_accounts" | "accounts" | "account" => Some(Self::LinkedAccounts),
            "associations" | "association" | "installs" => Some(Self::Associations),
            _ => None,
        }
    }

    /// Backend collection the rows of this type live in.
    pub fn entity_name(&self) -> &'static str {
        match self {
            Self::Devices => DEVICE_ENTITY,
            Self::Apps => APP_ENTITY,
            Self::LinkedAccounts => LINKED_ACCOUNT_ENTITY,
            Self::Associations => ASSOCIATION_ENTITY,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Import mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Create missing rows; leave existing rows untouched.
    AddOnly,
    /// Create missing rows and update rows whose fields differ.
    Upsert,
    /// Delete every row of the target type, then create.
    Replace,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddOnly => "add_only",
            Self::Upsert => "upsert",
            Self::Replace => "replace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "add_only" | "add" => Some(Self::AddOnly),
            "upsert" | "update" => Some(Self::Upsert),
            "replace" | "wipe" => Some(Self::Replace),
            _ => None,
        }
    }

    pub fn updates_existing(&self) -> bool {
        matches!(self, Self::Upsert)
    }
}

impl std::fmt::Display for ImportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status from the number of applied and failed rows.
///
/// No failures is success (even if every row was skipped); failures with
/// at least one applied row is partial; anything else is failure.
pub fn determine_status(applied: usize, failed: usize) -> ImportStatus {
    match (applied, failed) {
        (_, 0) => ImportStatus::Success,
        (0, _) => ImportStatus::Failure,
        _ => ImportStatus::Partial,
    }
}

// ---------------------------------------------------------------------------
// Cell readers
// ---------------------------------------------------------------------------

fn text(row: &RawRow, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(row: &RawRow, field: &str) -> Result<String, CoreError> {
    text(row, field).ok_or_else(|| CoreError::Validation(format!("missing {field}")))
}

fn integer(row: &RawRow, field: &str) -> Result<Option<i64>, CoreError> {
    let invalid = || CoreError::Validation(format!("{field} must be an integer"));
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(Some(f as i64)),
                _ => Err(invalid()),
            },
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn required_number(row: &RawRow, field: &str) -> Result<BinocularNumber, CoreError> {
    integer(row, field)?.ok_or_else(|| CoreError::Validation(format!("missing {field}")))
}

fn boolean(row: &RawRow, field: &str) -> Result<Option<bool>, CoreError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(CoreError::Validation(format!("{field} must be a boolean"))),
        },
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "y" | "1" => Ok(Some(true)),
            "false" | "no" | "n" | "0" => Ok(Some(false)),
            _ => Err(CoreError::Validation(format!("{field} must be a boolean"))),
        },
        Some(_) => Err(CoreError::Validation(format!("{field} must be a boolean"))),
    }
}

fn decimal(row: &RawRow, field: &str) -> Result<Option<f64>, CoreError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('$')
            .parse()
            .map(Some)
            .map_err(|_| CoreError::Validation(format!("{field} must be a number"))),
        Some(_) => Err(CoreError::Validation(format!("{field} must be a number"))),
    }
}

fn list(row: &RawRow, field: &str) -> Option<Vec<String>> {
    let items: Vec<String> = match row.get(field)? {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(LIST_SEPARATORS)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    Some(items)
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

pub fn device_from_row(row: &RawRow) -> Result<DeviceDraft, CoreError> {
    Ok(DeviceDraft {
        binocular_number: required_number(row, "binocular_number")?,
        display_name: text(row, "display_name"),
        model: text(row, "model"),
        primary_email: text(row, "primary_email"),
        is_disabled: boolean(row, "is_disabled")?,
        disable_reason: text(row, "disable_reason"),
        status: text(row, "status"),
    })
}

pub fn app_from_row(row: &RawRow) -> Result<AppDraft, CoreError> {
    Ok(AppDraft {
        name: required_text(row, "name")?,
        genres: list(row, "genres"),
        education_fields: list(row, "education_fields"),
        platforms: list(row, "platforms"),
        purchase_date: text(row, "purchase_date"),
        purchase_price: decimal(row, "purchase_price")?,
        store_link: text(row, "store_link"),
        player_count: text(row, "player_count"),
        internet_required: boolean(row, "internet_required")?,
        hand_tracking: boolean(row, "hand_tracking")?,
        description: text(row, "description"),
    })
}

/// A linked-account row addressed by binocular number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    pub binocular_number: BinocularNumber,
    pub account_type: String,
    #[serde(flatten)]
    pub credentials: Credentials,
}

pub fn account_from_row(row: &RawRow) -> Result<AccountRow, CoreError> {
    Ok(AccountRow {
        binocular_number: required_number(row, "binocular_number")?,
        account_type: required_text(row, "account_type")?,
        credentials: Credentials {
            email: text(row, "email"),
            username: text(row, "username"),
            password: text(row, "password"),
        },
    })
}

/// An association row addressed by binocular number and app name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRow {
    pub binocular_number: BinocularNumber,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_date: Option<String>,
}

pub fn association_from_row(row: &RawRow) -> Result<AssociationRow, CoreError> {
    Ok(AssociationRow {
        binocular_number: required_number(row, "binocular_number")?,
        app_name: required_text(row, "app_name")?,
        status: text(row, "status"),
        installation_date: text(row, "installation_date"),
    })
}

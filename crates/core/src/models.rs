//! Entity rows and create DTOs for the hosted entity backend.
//!
//! Field names match the backend's JSON payloads. Extra fields the backend
//! attaches (audit timestamps, owner ids) are ignored on read, and `null`
//! is accepted wherever a default exists.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::{BinocularNumber, EntityId};

// ---------------------------------------------------------------------------
// Collection names
// ---------------------------------------------------------------------------

pub const DEVICE_ENTITY: &str = "VRDevice";
pub const APP_ENTITY: &str = "VRApp";
pub const ASSOCIATION_ENTITY: &str = "DeviceApp";
pub const LINKED_ACCOUNT_ENTITY: &str = "DeviceLinkedAccount";
pub const IMPORT_JOB_ENTITY: &str = "ImportJob";

/// Status written on association rows created by the reconciler.
pub const ASSOCIATION_STATUS_INSTALLED: &str = "installed";

/// A row type stored in a single, fixed backend collection.
pub trait Entity: serde::de::DeserializeOwned + Send + Sync {
    /// Collection name on the backend.
    const NAME: &'static str;

    /// Backend-assigned row id.
    fn id(&self) -> &str;
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Patch helpers
// ---------------------------------------------------------------------------

/// Record `field` in `patch` when the wanted value is set and differs from
/// an optional current value.
fn patch_opt<T: Serialize + PartialEq>(
    patch: &mut Map<String, Value>,
    field: &str,
    wanted: &Option<T>,
    current: &Option<T>,
) {
    if let Some(value) = wanted {
        if current.as_ref() != Some(value) {
            patch.insert(field.to_string(), serde_json::to_value(value).unwrap_or(Value::Null));
        }
    }
}

/// Record `field` in `patch` when the wanted value is set and differs from
/// a required current value.
fn patch_val<T: Serialize + PartialEq>(
    patch: &mut Map<String, Value>,
    field: &str,
    wanted: &Option<T>,
    current: &T,
) {
    if let Some(value) = wanted {
        if value != current {
            patch.insert(field.to_string(), serde_json::to_value(value).unwrap_or(Value::Null));
        }
    }
}

fn into_patch(patch: Map<String, Value>) -> Option<Value> {
    if patch.is_empty() {
        None
    } else {
        Some(Value::Object(patch))
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A headset row (`VRDevice`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    pub binocular_number: BinocularNumber,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub primary_email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_disabled: bool,
    #[serde(default)]
    pub disable_reason: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Entity for Device {
    const NAME: &'static str = DEVICE_ENTITY;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Device {
    /// Display name, falling back to `Binocular #<n>`.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Binocular #{}", self.binocular_number),
        }
    }
}

/// Create / import DTO for a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDraft {
    pub binocular_number: BinocularNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl DeviceDraft {
    /// Update patch holding the fields of this draft that differ from
    /// `existing`, or `None` when the row is already up to date.
    pub fn changes_from(&self, existing: &Device) -> Option<Value> {
        let mut patch = Map::new();
        patch_opt(&mut patch, "display_name", &self.display_name, &existing.display_name);
        patch_opt(&mut patch, "model", &self.model, &existing.model);
        patch_opt(&mut patch, "primary_email", &self.primary_email, &existing.primary_email);
        patch_val(&mut patch, "is_disabled", &self.is_disabled, &existing.is_disabled);
        patch_opt(&mut patch, "disable_reason", &self.disable_reason, &existing.disable_reason);
        patch_opt(&mut patch, "status", &self.status, &existing.status);
        into_patch(patch)
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// An application row (`VRApp`).
///
/// `is_installed` is derived: it mirrors whether any association row
/// references this app and is rewritten after every reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: EntityId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub education_fields: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub store_link: Option<String>,
    #[serde(default)]
    pub player_count: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub internet_required: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hand_tracking: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_installed: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Entity for App {
    const NAME: &'static str = APP_ENTITY;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Normalized key used to match app names case-insensitively.
pub fn app_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Create / import DTO for an app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_tracking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AppDraft {
    /// Update patch for `existing`. The name is the match key and is never
    /// patched; drafts only match apps whose name is equal ignoring case.
    pub fn changes_from(&self, existing: &App) -> Option<Value> {
        let mut patch = Map::new();
        patch_val(&mut patch, "genres", &self.genres, &existing.genres);
        patch_val(&mut patch, "education_fields", &self.education_fields, &existing.education_fields);
        patch_val(&mut patch, "platforms", &self.platforms, &existing.platforms);
        patch_opt(&mut patch, "purchase_date", &self.purchase_date, &existing.purchase_date);
        patch_opt(&mut patch, "purchase_price", &self.purchase_price, &existing.purchase_price);
        patch_opt(&mut patch, "store_link", &self.store_link, &existing.store_link);
        patch_opt(&mut patch, "player_count", &self.player_count, &existing.player_count);
        patch_val(&mut patch, "internet_required", &self.internet_required, &existing.internet_required);
        patch_val(&mut patch, "hand_tracking", &self.hand_tracking, &existing.hand_tracking);
        patch_opt(&mut patch, "description", &self.description, &existing.description);
        into_patch(patch)
    }
}

// ---------------------------------------------------------------------------
// Association
// ---------------------------------------------------------------------------

/// A device↔app join row (`DeviceApp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub id: EntityId,
    pub device_id: EntityId,
    pub app_id: EntityId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub installation_date: Option<String>,
}

impl Entity for Association {
    const NAME: &'static str = ASSOCIATION_ENTITY;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDraft {
    pub device_id: EntityId,
    pub app_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_date: Option<String>,
}

impl AssociationDraft {
    /// Draft stamped as installed today (UTC).
    pub fn installed_today(device_id: &str, app_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            app_id: app_id.to_string(),
            status: Some(ASSOCIATION_STATUS_INSTALLED.to_string()),
            installation_date: Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Linked account
// ---------------------------------------------------------------------------

/// A credential set attached to a device (`DeviceLinkedAccount`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub id: EntityId,
    pub device_id: EntityId,
    pub account_type: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Entity for LinkedAccount {
    const NAME: &'static str = LINKED_ACCOUNT_ENTITY;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Email / username / password triple for a linked account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.username.is_none() && self.password.is_none()
    }

    /// Update patch for `existing`, or `None` when nothing changed.
    pub fn changes_from(&self, existing: &LinkedAccount) -> Option<Value> {
        let mut patch = Map::new();
        patch_opt(&mut patch, "email", &self.email, &existing.email);
        patch_opt(&mut patch, "username", &self.username, &existing.username);
        patch_opt(&mut patch, "password", &self.password, &existing.password);
        into_patch(patch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedAccountDraft {
    pub device_id: EntityId,
    pub account_type: String,
    #[serde(flatten)]
    pub credentials: Credentials,
}

// ---------------------------------------------------------------------------
// Option catalogs
// ---------------------------------------------------------------------------

/// The user-extensible lookup lists app attributes draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionCatalog {
    Genre,
    EducationField,
    Platform,
    PlayerCount,
}

impl OptionCatalog {
    pub const ALL: &'static [OptionCatalog] = &[
        Self::Genre,
        Self::EducationField,
        Self::Platform,
        Self::PlayerCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genre => "genre",
            Self::EducationField => "education_field",
            Self::Platform => "platform",
            Self::PlayerCount => "player_count",
        }
    }

    /// Backend collection holding this catalog's rows.
    pub fn entity_name(&self) -> &'static str {
        match self {
            Self::Genre => "GenreOption",
            Self::EducationField => "EducationFieldOption",
            Self::Platform => "PlatformOption",
            Self::PlayerCount => "PlayerCountOption",
        }
    }

    /// Parse a catalog name. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "genre" | "genres" => Some(Self::Genre),
            "education_field" | "education_fields" => Some(Self::EducationField),
            "platform" | "platforms" => Some(Self::Platform),
            "player_count" | "player_counts" => Some(Self::PlayerCount),
            _ => None,
        }
    }

    /// Whether `app` references `value` through this catalog's attribute.
    pub fn app_uses(&self, app: &App, value: &str) -> bool {
        let matches = |v: &String| v.eq_ignore_ascii_case(value);
        match self {
            Self::Genre => app.genres.iter().any(matches),
            Self::EducationField => app.education_fields.iter().any(matches),
            Self::Platform => app.platforms.iter().any(matches),
            Self::PlayerCount => app.player_count.as_ref().is_some_and(matches),
        }
    }
}

impl std::fmt::Display for OptionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{value, label, active}` lookup row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub id: EntityId,
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDraft {
    pub value: String,
    pub label: String,
    pub active: bool,
}

impl OptionDraft {
    /// Active option whose label is the value itself.
    pub fn from_value(value: &str) -> Self {
        Self {
            value: value.to_string(),
            label: value.to_string(),
            active: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Import job
// ---------------------------------------------------------------------------

/// Terminal status of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Partial,
    Failure,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of one data import (`ImportJob`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: EntityId,
    pub file_name: String,
    pub data_type: String,
    pub status: ImportStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Value,
    #[serde(default)]
    pub error_log: Option<String>,
}

impl Entity for ImportJob {
    const NAME: &'static str = IMPORT_JOB_ENTITY;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportJobDraft {
    pub file_name: String,
    pub data_type: String,
    pub status: ImportStatus,
    pub options: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

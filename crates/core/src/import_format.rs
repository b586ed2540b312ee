//! Parsing of uploaded import files and column→field mapping.
//!
//! CSV handling is deliberately naive: the first non-empty line holds the
//! headers and every line is split on `,` with no quoted-field support.
//! JSON accepts an array of flat objects or a single object.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One input row: column (or field) name → cell value.
pub type RawRow = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Json,
}

impl ImportFormat {
    /// Derive the format from a file name's extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Parse file content in the given format.
pub fn parse_rows(format: ImportFormat, content: &str) -> Result<Vec<RawRow>, CoreError> {
    match format {
        ImportFormat::Csv => Ok(parse_csv(content)),
        ImportFormat::Json => parse_json(content),
    }
}

/// Split CSV text into rows keyed by header. Cells are trimmed; empty
/// cells and cells beyond the header count are dropped.
pub fn parse_csv(content: &str) -> Vec<RawRow> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());

    let headers: Vec<String> = match lines.next() {
        Some(line) => line.split(',').map(|h| h.trim().to_string()).collect(),
        None => return Vec::new(),
    };

    lines
        .map(|line| {
            headers
                .iter()
                .zip(line.split(','))
                .filter(|(header, cell)| !header.is_empty() && !cell.trim().is_empty())
                .map(|(header, cell)| (header.clone(), Value::String(cell.trim().to_string())))
                .collect()
        })
        .collect()
}

/// Parse a JSON array of flat objects, or a single object.
pub fn parse_json(content: &str) -> Result<Vec<RawRow>, CoreError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| CoreError::Validation(format!("Invalid JSON: {e}")))?;

    let objects = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => {
            return Err(CoreError::Validation(
                "JSON import must be an array of objects or a single object".to_string(),
            ))
        }
    };

    objects
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(CoreError::Validation(format!(
                "JSON item {} is not an object",
                i + 1
            ))),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// User-defined `column → field` mapping.
///
/// An empty mapping passes columns through unchanged. A non-empty mapping
/// keeps mapped columns only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    columns: HashMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, field: &str) -> Self {
        self.columns.insert(column.to_string(), field.to_string());
        self
    }

    /// Parse `column=field` pairs.
    pub fn parse_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, CoreError> {
        let mut mapping = Self::new();
        for pair in pairs {
            let (column, field) = pair.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!("Invalid mapping '{pair}'. Expected column=field"))
            })?;
            let (column, field) = (column.trim(), field.trim());
            if column.is_empty() || field.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Invalid mapping '{pair}'. Column and field must be non-empty"
                )));
            }
            mapping.columns.insert(column.to_string(), field.to_string());
        }
        Ok(mapping)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Rename mapped columns to their fields and drop unmapped ones.
    pub fn apply(&self, row: &RawRow) -> RawRow {
        if self.columns.is_empty() {
            return row.clone();
        }
        row.iter()
            .filter_map(|(column, value)| {
                self.columns
                    .get(column)
                    .map(|field| (field.clone(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn csv_rows_are_keyed_by_header() {
        let rows = parse_csv("Number,Name\n3, Alpha \n\n7,Bravo\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Number"], json!("3"));
        assert_eq!(rows[0]["Name"], json!("Alpha"));
        assert_eq!(rows[1]["Name"], json!("Bravo"));
    }

    #[test]
    fn csv_short_rows_omit_missing_columns() {
        let rows = parse_csv("a,b,c\n1,,3\n4");
        assert_eq!(rows[0].len(), 2);
        assert!(!rows[0].contains_key("b"));
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn csv_does_not_understand_quotes() {
        let rows = parse_csv("name,notes\n\"Smith, J\",x");
        assert_eq!(rows[0]["name"], json!("\"Smith"));
        assert_eq!(rows[0]["notes"], json!("J\""));
    }

    #[test]
    fn empty_csv_has_no_rows() {
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("only,headers").is_empty());
    }

    #[test]
    fn json_accepts_array_or_object() {
        let rows = parse_json(r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = parse_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(rows[0]["a"], json!(1));
    }

    #[test]
    fn json_rejects_scalars_and_nested_scalars() {
        assert_matches!(parse_json("42"), Err(CoreError::Validation(_)));
        assert_matches!(parse_json("[1]"), Err(CoreError::Validation(_)));
        assert_matches!(parse_json("{"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn mapping_renames_and_drops_unmapped() {
        let mapping = ColumnMapping::new().with("Number", "binocular_number");
        let row: RawRow = [("Number".to_string(), json!("3")), ("Junk".to_string(), json!("x"))].into();
        let mapped = mapping.apply(&row);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped["binocular_number"], json!("3"));
    }

    #[test]
    fn empty_mapping_is_identity() {
        let row: RawRow = [("name".to_string(), json!("Beat Saber"))].into();
        assert_eq!(ColumnMapping::new().apply(&row), row);
    }

    #[test]
    fn mapping_pairs_parse() {
        let mapping = ColumnMapping::parse_pairs(["Headset=binocular_number", " App = app_name "]).unwrap();
        let row: RawRow = [("App".to_string(), json!("Beat Saber"))].into();
        assert_eq!(mapping.apply(&row)["app_name"], json!("Beat Saber"));
        assert_matches!(ColumnMapping::parse_pairs(["nope"]), Err(CoreError::Validation(_)));
        assert_matches!(ColumnMapping::parse_pairs(["=x"]), Err(CoreError::Validation(_)));
    }

    #[test]
    fn format_from_file_name() {
        assert_eq!(ImportFormat::from_file_name("devices.CSV"), Some(ImportFormat::Csv));
        assert_eq!(ImportFormat::from_file_name("apps.json"), Some(ImportFormat::Json));
        assert_eq!(ImportFormat::from_file_name("notes.txt"), None);
        assert_eq!(ImportFormat::from_file_name("README"), None);
    }
}

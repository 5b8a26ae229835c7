//! User-declared scalar columns.
//!
//! An index may carry extra scalar columns alongside each vector; their
//! values live in a rowid-keyed shadow table and come back with search
//! results. Declared types arrive as untyped strings at CREATE time and
//! are fixed into a tagged variant here, carried statically afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{DiskVecError, Result};
use crate::host::Value;

/// Column names the SQL surface claims for itself.
pub const RESERVED_COLUMN_NAMES: &[&str] =
    &["vector", "distance", "k", "rowid", "search_list_size"];

/// Declared type of a scalar column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// Raw bytes.
    Blob,
}

impl ColumnType {
    /// Parses a declared type name (case-insensitive).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "TEXT" => Some(ColumnType::Text),
            "INTEGER" => Some(ColumnType::Integer),
            "REAL" => Some(ColumnType::Real),
            "BLOB" => Some(ColumnType::Blob),
            _ => None,
        }
    }

    /// The SQL type keyword.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
        }
    }

    /// True when `value` is acceptable for this column (NULL always is).
    #[must_use]
    pub fn admits(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Text, Value::Text(_))
            | (ColumnType::Integer, Value::Integer(_))
            | (ColumnType::Real, Value::Real(_))
            | (ColumnType::Blob, Value::Blob(_)) => true,
            // Integer affinity: REAL columns take integers.
            (ColumnType::Real, Value::Integer(_)) => true,
            _ => false,
        }
    }
}

/// One declared scalar column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name (validated identifier).
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// True for names matching `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates a declared column list: identifier shape, reserved names,
/// duplicates.
///
/// # Errors
///
/// Returns [`DiskVecError::Invalid`] naming the offending column.
pub fn validate_columns(columns: &[ColumnDef]) -> Result<()> {
    for (i, col) in columns.iter().enumerate() {
        if !is_valid_identifier(&col.name) {
            return Err(DiskVecError::Invalid(format!(
                "column name {:?} is not a valid identifier",
                col.name
            )));
        }
        let lower = col.name.to_ascii_lowercase();
        if RESERVED_COLUMN_NAMES.contains(&lower.as_str()) {
            return Err(DiskVecError::Invalid(format!(
                "column name {:?} is reserved",
                col.name
            )));
        }
        if columns[..i]
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&col.name))
        {
            return Err(DiskVecError::Invalid(format!(
                "duplicate column name {:?}",
                col.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, t: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            column_type: t,
        }
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(ColumnType::parse("TEXT"), Some(ColumnType::Text));
        assert_eq!(ColumnType::parse("integer"), Some(ColumnType::Integer));
        assert_eq!(ColumnType::parse("Real"), Some(ColumnType::Real));
        assert_eq!(ColumnType::parse("BLOB"), Some(ColumnType::Blob));
        assert_eq!(ColumnType::parse("VARCHAR"), None);
    }

    #[test]
    fn test_identifier_shapes() {
        assert!(is_valid_identifier("label"));
        assert!(is_valid_identifier("_x9"));
        assert!(!is_valid_identifier("9lives"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("semi;colon"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        for name in ["vector", "distance", "k", "rowid", "search_list_size"] {
            let err = validate_columns(&[col(name, ColumnType::Text)]).unwrap_err();
            assert!(matches!(err, DiskVecError::Invalid(_)));
        }
        // Case-insensitive.
        assert!(validate_columns(&[col("Vector", ColumnType::Text)]).is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let cols = [
            col("label", ColumnType::Text),
            col("LABEL", ColumnType::Integer),
        ];
        assert!(validate_columns(&cols).is_err());
    }

    #[test]
    fn test_admits_by_type() {
        assert!(ColumnType::Text.admits(&Value::Text("x".into())));
        assert!(ColumnType::Text.admits(&Value::Null));
        assert!(!ColumnType::Text.admits(&Value::Integer(1)));
        assert!(ColumnType::Real.admits(&Value::Integer(1)));
        assert!(ColumnType::Blob.admits(&Value::Blob(vec![1])));
        assert!(!ColumnType::Integer.admits(&Value::Real(1.5)));
    }

    #[test]
    fn test_catalog_json_roundtrip() {
        let cols = vec![
            col("label", ColumnType::Text),
            col("score", ColumnType::Real),
        ];
        let json = serde_json::to_string(&cols).unwrap();
        assert!(json.contains("\"TEXT\""));
        let back: Vec<ColumnDef> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cols);
    }
}

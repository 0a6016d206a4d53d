//! Column codecs shared by the table modules.
//!
//! UUIDs and timestamps go through rusqlite's `uuid` and `chrono` support.
//! Enums are stored as their lowercase/uppercase wire strings and label maps
//! as JSON text.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

use crate::error::{StoreError, StoreResult};

/// Parse a text column through `FromStr`.
pub(crate) fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into()))
}

/// Decode a JSON label map. NULL and empty text read as no labels.
pub(crate) fn labels(row: &Row<'_>, idx: usize) -> rusqlite::Result<BTreeMap<String, String>> {
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref() {
        None | Some("") => Ok(BTreeMap::new()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

pub(crate) fn encode_labels(
    column: &'static str,
    labels: &BTreeMap<String, String>,
) -> StoreResult<String> {
    serde_json::to_string(labels).map_err(|e| StoreError::Encode {
        column,
        message: e.to_string(),
    })
}

/// SQLite integers are i64; pagination arguments are usize.
pub(crate) fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use weir_core::domain::VariantStatus;

    #[test]
    fn test_parsed_and_labels() {
        let conn = Connection::open_in_memory().unwrap();
        let (status, labels) = conn
            .query_row(
                r#"SELECT 'active', '{"team":"ml"}'"#,
                [],
                |row| Ok((parsed::<VariantStatus>(row, 0)?, labels(row, 1)?)),
            )
            .unwrap();
        assert_eq!(status, VariantStatus::Active);
        assert_eq!(labels.get("team").map(String::as_str), Some("ml"));
    }

    #[test]
    fn test_bad_enum_is_conversion_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 'paused'", [], |row| parsed::<VariantStatus>(row, 0))
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(0, Type::Text, _)));
    }

    #[test]
    fn test_null_labels_are_empty() {
        let conn = Connection::open_in_memory().unwrap();
        let labels = conn.query_row("SELECT NULL", [], |row| labels(row, 0)).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn test_count_conversion() {
        assert_eq!(to_sql_count(25), 25);
        assert_eq!(to_sql_count(usize::MAX), i64::MAX);
    }
}

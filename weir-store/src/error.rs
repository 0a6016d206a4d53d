//! Store-level errors and their translation into domain errors.

use rusqlite::ErrorCode;
use thiserror::Error;
use weir_core::WeirError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot encode column '{column}': {message}")]
    Encode { column: &'static str, message: String },

    #[error("Migration {version} failed: {source}")]
    Migration {
        version: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// A domain sentinel raised inside a store closure.
    #[error(transparent)]
    Domain(#[from] WeirError),
}

impl From<StoreError> for WeirError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(inner) => inner,
            other => WeirError::repository(other.to_string()),
        }
    }
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

/// True when `err` is a UNIQUE or PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

pub(crate) trait SqlResultExt<T> {
    /// Replace a uniqueness violation with `sentinel`.
    fn on_conflict(self, sentinel: WeirError) -> StoreResult<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn on_conflict(self, sentinel: WeirError) -> StoreResult<T> {
        self.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Domain(sentinel)
            } else {
                StoreError::Sqlite(e)
            }
        })
    }
}

/// Map "no row changed" to `sentinel`.
pub(crate) fn expect_changed(changed: usize, sentinel: WeirError) -> StoreResult<()> {
    if changed == 0 {
        Err(StoreError::Domain(sentinel))
    } else {
        Ok(())
    }
}

//! # weir store
//!
//! SQLite implementation of the repository ports in `weir_core::ports`.
//!
//! One connection sits behind a mutex; every call runs on the blocking
//! pool and races the request's cancellation and deadline. Multi-row
//! writes (`update_many`, virtual-model deletion) run in one transaction.

pub mod error;
pub mod schema;

mod codec;
mod registry;
mod traffic;
mod virtual_model;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, info};
use weir_core::config::DatabaseConfig;
use weir_core::ports::StoreHealth;
use weir_core::{RequestContext, Result, WeirError};

pub use error::StoreError;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply pending migrations.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(path = %path.display(), journal = %journal, "Opened SQLite database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if config.is_in_memory() {
            Self::open_in_memory()
        } else {
            Self::open(&config.path, Duration::from_millis(config.busy_timeout_ms))
        }
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let applied = schema::migrate(&mut conn)?;
        debug!(applied, version = schema::SCHEMA_VERSION, "Schema up to date");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn schema_version(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        schema::current_version(&conn)
    }

    /// Run `f` against the connection on the blocking pool.
    pub(crate) async fn call<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        ctx.run(async move {
            tokio::task::spawn_blocking(move || {
                let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
                f(&mut conn).map_err(WeirError::from)
            })
            .await
            .map_err(|e| WeirError::repository(format!("Task join error: {e}")))?
        })
        .await
    }
}

#[async_trait]
impl StoreHealth for SqliteStore {
    async fn ping(&self, ctx: &RequestContext) -> Result<()> {
        self.call(ctx, |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}

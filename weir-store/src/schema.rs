//! Schema migrations, tracked with `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Forward-only migrations. Index `i` moves the schema to version `i + 1`.
const MIGRATIONS: &[&str] = &[
    // 1: registry records the control plane reads
    r#"
    CREATE TABLE serving_environments (
        id          BLOB PRIMARY KEY,
        project_id  BLOB NOT NULL,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        external_id TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE TABLE registered_models (
        id          BLOB PRIMARY KEY,
        project_id  BLOB NOT NULL,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE TABLE model_versions (
        id                      BLOB PRIMARY KEY,
        project_id              BLOB NOT NULL,
        registered_model_id     BLOB NOT NULL,
        name                    TEXT NOT NULL,
        description             TEXT NOT NULL DEFAULT '',
        status                  TEXT NOT NULL,
        model_framework         TEXT,
        model_framework_version TEXT,
        container_image         TEXT,
        uri                     TEXT NOT NULL,
        labels                  TEXT NOT NULL DEFAULT '{}',
        created_at              TEXT NOT NULL,
        updated_at              TEXT NOT NULL
    );

    CREATE TABLE inference_services (
        id                     BLOB PRIMARY KEY,
        project_id             BLOB NOT NULL,
        name                   TEXT NOT NULL,
        external_id            TEXT,
        serving_environment_id BLOB NOT NULL,
        registered_model_id    BLOB NOT NULL,
        desired_state          TEXT NOT NULL,
        current_state          TEXT NOT NULL,
        runtime                TEXT NOT NULL DEFAULT '',
        url                    TEXT,
        last_error             TEXT,
        labels                 TEXT NOT NULL DEFAULT '{}',
        created_at             TEXT NOT NULL,
        updated_at             TEXT NOT NULL,
        UNIQUE (project_id, serving_environment_id, name)
    );
    "#,
    // 2: traffic management
    r#"
    CREATE TABLE traffic_configs (
        id                   BLOB PRIMARY KEY,
        project_id           BLOB NOT NULL,
        inference_service_id BLOB NOT NULL,
        strategy             TEXT NOT NULL,
        gateway_route_name   TEXT,
        status               TEXT NOT NULL,
        created_at           TEXT NOT NULL,
        updated_at           TEXT NOT NULL,
        UNIQUE (project_id, inference_service_id)
    );

    CREATE TABLE traffic_variants (
        id                    BLOB PRIMARY KEY,
        traffic_config_id     BLOB NOT NULL REFERENCES traffic_configs (id) ON DELETE CASCADE,
        variant_name          TEXT NOT NULL,
        model_version_id      BLOB NOT NULL,
        weight                INTEGER NOT NULL CHECK (weight BETWEEN 0 AND 100),
        runtime_resource_name TEXT NOT NULL DEFAULT '',
        runtime_revision      TEXT,
        status                TEXT NOT NULL,
        created_at            TEXT NOT NULL,
        updated_at            TEXT NOT NULL,
        UNIQUE (traffic_config_id, variant_name)
    );

    CREATE INDEX idx_traffic_configs_project ON traffic_configs (project_id, created_at);
    "#,
    // 3: virtual models
    r#"
    CREATE TABLE virtual_models (
        id                 BLOB PRIMARY KEY,
        project_id         BLOB NOT NULL,
        name               TEXT NOT NULL,
        description        TEXT NOT NULL DEFAULT '',
        gateway_route_name TEXT,
        status             TEXT NOT NULL,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL,
        UNIQUE (project_id, name)
    );

    CREATE TABLE virtual_model_backends (
        id                  BLOB PRIMARY KEY,
        virtual_model_id    BLOB NOT NULL REFERENCES virtual_models (id) ON DELETE CASCADE,
        backend_name        TEXT NOT NULL,
        backend_namespace   TEXT,
        model_name_override TEXT,
        weight              INTEGER NOT NULL CHECK (weight BETWEEN 0 AND 100),
        priority            INTEGER NOT NULL CHECK (priority >= 0),
        status              TEXT NOT NULL,
        created_at          TEXT NOT NULL,
        updated_at          TEXT NOT NULL,
        UNIQUE (virtual_model_id, backend_name)
    );
    "#,
];

/// Latest schema version this build knows about.
pub const SCHEMA_VERSION: usize = MIGRATIONS.len();

pub fn current_version(conn: &Connection) -> StoreResult<usize> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(usize::try_from(version).unwrap_or(0))
}

/// Apply pending migrations, each in its own transaction. Returns how many
/// ran.
pub fn migrate(conn: &mut Connection) -> StoreResult<usize> {
    let from = current_version(conn)?;
    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(from) {
        let version = idx + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .and_then(|()| tx.pragma_update(None, "user_version", version as i64))
            .map_err(|source| StoreError::Migration { version, source })?;
        tx.commit()?;
        info!(version, "Applied schema migration");
    }
    Ok(SCHEMA_VERSION.saturating_sub(from))
}

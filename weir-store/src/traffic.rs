//! `traffic_configs` and `traffic_variants`.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, Transaction, params};
use uuid::Uuid;
use weir_core::domain::{TrafficConfig, TrafficConfigFilter, TrafficVariant};
use weir_core::ports::{TrafficConfigRepository, TrafficVariantRepository};
use weir_core::{RequestContext, Result, WeirError};

use crate::SqliteStore;
use crate::codec::{parsed, to_sql_count};
use crate::error::{SqlResultExt, StoreError, expect_changed};

const CONFIG_COLUMNS: &str = "
    SELECT c.id, c.created_at, c.updated_at, c.project_id, c.inference_service_id,
           c.strategy, c.gateway_route_name, c.status, i.name
    FROM traffic_configs c
    LEFT JOIN inference_services i ON i.id = c.inference_service_id";

const VARIANT_COLUMNS: &str = "
    SELECT v.id, v.created_at, v.updated_at, v.traffic_config_id, v.variant_name,
           v.model_version_id, v.weight, v.runtime_resource_name, v.runtime_revision,
           v.status, mv.name
    FROM traffic_variants v
    JOIN traffic_configs c ON c.id = v.traffic_config_id
    LEFT JOIN model_versions mv ON mv.id = v.model_version_id";

/// Restricts variant writes to the project bound at parameter `idx`.
fn in_project(idx: usize) -> String {
    format!("traffic_config_id IN (SELECT id FROM traffic_configs WHERE project_id = ?{idx})")
}

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<TrafficConfig> {
    Ok(TrafficConfig {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        project_id: row.get(3)?,
        inference_service_id: row.get(4)?,
        strategy: parsed(row, 5)?,
        gateway_route_name: row.get(6)?,
        status: parsed(row, 7)?,
        variants: Vec::new(),
        inference_service_name: row.get(8)?,
    })
}

fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<TrafficVariant> {
    Ok(TrafficVariant {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        traffic_config_id: row.get(3)?,
        variant_name: row.get(4)?,
        model_version_id: row.get(5)?,
        weight: row.get(6)?,
        runtime_resource_name: row.get(7)?,
        runtime_revision: row.get(8)?,
        status: parsed(row, 9)?,
        model_version_name: row.get(10)?,
    })
}

fn write_variant(tx: &Transaction<'_>, project: Uuid, variant: &TrafficVariant) -> Result<(), StoreError> {
    let changed = tx
        .execute(
            &format!(
                "UPDATE traffic_variants
                 SET variant_name = ?1, model_version_id = ?2, weight = ?3,
                     runtime_resource_name = ?4, runtime_revision = ?5, status = ?6,
                     updated_at = ?7
                 WHERE id = ?8 AND {}",
                in_project(9)
            ),
            params![
                variant.variant_name,
                variant.model_version_id,
                variant.weight,
                variant.runtime_resource_name,
                variant.runtime_revision,
                variant.status.as_str(),
                variant.updated_at,
                variant.id,
                project,
            ],
        )
        .on_conflict(WeirError::VariantAlreadyExists)?;
    expect_changed(changed, WeirError::TrafficVariantNotFound)
}

#[async_trait]
impl TrafficConfigRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<()> {
        let config = config.clone();
        self.call(ctx, move |conn| {
            conn.execute(
                "INSERT INTO traffic_configs
                     (id, project_id, inference_service_id, strategy, gateway_route_name, status,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    config.id,
                    config.project_id,
                    config.inference_service_id,
                    config.strategy.as_str(),
                    config.gateway_route_name,
                    config.status.as_str(),
                    config.created_at,
                    config.updated_at,
                ],
            )
            .on_conflict(WeirError::TrafficConfigExists)?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<TrafficConfig> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                &format!("{CONFIG_COLUMNS} WHERE c.id = ?1 AND c.project_id = ?2"),
                params![id, project],
                config_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::TrafficConfigNotFound))
        })
        .await
    }

    async fn get_by_inference_service(
        &self,
        ctx: &RequestContext,
        inference_service_id: Uuid,
    ) -> Result<TrafficConfig> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                &format!("{CONFIG_COLUMNS} WHERE c.inference_service_id = ?1 AND c.project_id = ?2"),
                params![inference_service_id, project],
                config_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::TrafficConfigNotFound))
        })
        .await
    }

    async fn update(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<()> {
        let project = ctx.project_id();
        let config = config.clone();
        self.call(ctx, move |conn| {
            let changed = conn.execute(
                "UPDATE traffic_configs
                 SET strategy = ?1, gateway_route_name = ?2, status = ?3, updated_at = ?4
                 WHERE id = ?5 AND project_id = ?6",
                params![
                    config.strategy.as_str(),
                    config.gateway_route_name,
                    config.status.as_str(),
                    config.updated_at,
                    config.id,
                    project,
                ],
            )?;
            expect_changed(changed, WeirError::TrafficConfigNotFound)
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            // Variants go with the config through ON DELETE CASCADE.
            let changed = conn.execute(
                "DELETE FROM traffic_configs WHERE id = ?1 AND project_id = ?2",
                params![id, project],
            )?;
            expect_changed(changed, WeirError::TrafficConfigNotFound)
        })
        .await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &TrafficConfigFilter,
    ) -> Result<(Vec<TrafficConfig>, usize)> {
        let project = ctx.project_id();
        let filter = filter.clone();
        self.call(ctx, move |conn| {
            let isvc = filter.inference_service_id;
            let strategy = filter.strategy.map(|s| s.as_str());
            let status = filter.status.map(|s| s.as_str());
            let predicate = "c.project_id = ?1
                 AND (?2 IS NULL OR c.inference_service_id = ?2)
                 AND (?3 IS NULL OR c.strategy = ?3)
                 AND (?4 IS NULL OR c.status = ?4)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM traffic_configs c WHERE {predicate}"),
                params![project, isvc, strategy, status],
                |row| row.get(0),
            )?;

            let limit = filter.limit.map_or(-1, to_sql_count);
            let mut stmt = conn.prepare(&format!(
                "{CONFIG_COLUMNS} WHERE {predicate}
                 ORDER BY c.created_at DESC, c.id
                 LIMIT ?5 OFFSET ?6"
            ))?;
            let page = stmt
                .query_map(
                    params![project, isvc, strategy, status, limit, to_sql_count(filter.offset)],
                    config_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((page, usize::try_from(total).unwrap_or(0)))
        })
        .await
    }
}

#[async_trait]
impl TrafficVariantRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, variant: &TrafficVariant) -> Result<()> {
        let project = ctx.project_id();
        let variant = variant.clone();
        self.call(ctx, move |conn| {
            let tx = conn.transaction()?;
            let owned: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM traffic_configs WHERE id = ?1 AND project_id = ?2)",
                params![variant.traffic_config_id, project],
                |row| row.get(0),
            )?;
            if !owned {
                return Err(WeirError::TrafficConfigNotFound.into());
            }
            tx.execute(
                "INSERT INTO traffic_variants
                     (id, traffic_config_id, variant_name, model_version_id, weight,
                      runtime_resource_name, runtime_revision, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    variant.id,
                    variant.traffic_config_id,
                    variant.variant_name,
                    variant.model_version_id,
                    variant.weight,
                    variant.runtime_resource_name,
                    variant.runtime_revision,
                    variant.status.as_str(),
                    variant.created_at,
                    variant.updated_at,
                ],
            )
            .on_conflict(WeirError::VariantAlreadyExists)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<TrafficVariant> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                &format!("{VARIANT_COLUMNS} WHERE v.id = ?1 AND c.project_id = ?2"),
                params![id, project],
                variant_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::TrafficVariantNotFound))
        })
        .await
    }

    async fn get_by_name(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
    ) -> Result<TrafficVariant> {
        let project = ctx.project_id();
        let name = name.to_string();
        self.call(ctx, move |conn| {
            conn.query_row(
                &format!(
                    "{VARIANT_COLUMNS}
                     WHERE v.traffic_config_id = ?1 AND v.variant_name = ?2 AND c.project_id = ?3"
                ),
                params![config_id, name, project],
                variant_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::TrafficVariantNotFound))
        })
        .await
    }

    async fn update(&self, ctx: &RequestContext, variant: &TrafficVariant) -> Result<()> {
        self.update_many(ctx, std::slice::from_ref(variant)).await
    }

    async fn update_many(&self, ctx: &RequestContext, variants: &[TrafficVariant]) -> Result<()> {
        let project = ctx.project_id();
        let variants = variants.to_vec();
        self.call(ctx, move |conn| {
            let tx = conn.transaction()?;
            // Park every touched row on a unique placeholder name first so
            // the UNIQUE(config, name) check only sees the final names.
            for variant in &variants {
                let changed = tx.execute(
                    &format!(
                        "UPDATE traffic_variants SET variant_name = ?1
                         WHERE id = ?2 AND {}",
                        in_project(3)
                    ),
                    params![format!("~{}", variant.id.simple()), variant.id, project],
                )?;
                expect_changed(changed, WeirError::TrafficVariantNotFound)?;
            }
            for variant in &variants {
                write_variant(&tx, project, variant)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            let changed = conn.execute(
                &format!("DELETE FROM traffic_variants WHERE id = ?1 AND {}", in_project(2)),
                params![id, project],
            )?;
            expect_changed(changed, WeirError::TrafficVariantNotFound)
        })
        .await
    }

    async fn list_by_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<Vec<TrafficVariant>> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{VARIANT_COLUMNS}
                 WHERE v.traffic_config_id = ?1 AND c.project_id = ?2
                 ORDER BY v.created_at, v.id"
            ))?;
            let variants = stmt
                .query_map(params![config_id, project], variant_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(variants)
        })
        .await
    }

    async fn delete_by_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<()> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.execute(
                &format!(
                    "DELETE FROM traffic_variants WHERE traffic_config_id = ?1 AND {}",
                    in_project(2)
                ),
                params![config_id, project],
            )?;
            Ok(())
        })
        .await
    }
}

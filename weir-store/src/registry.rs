//! Registry tables: serving environments, registered models, model
//! versions, and inference services.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;
use weir_core::domain::{InferenceService, ModelVersion, RegisteredModel, ServingEnvironment};
use weir_core::ports::{
    InferenceServiceRepository, ModelVersionRepository, RegisteredModelRepository,
    ServingEnvironmentRepository,
};
use weir_core::{RequestContext, Result, WeirError};

use crate::SqliteStore;
use crate::codec::{encode_labels, labels, parsed};
use crate::error::{SqlResultExt, StoreError, expect_changed};

fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<ServingEnvironment> {
    Ok(ServingEnvironment {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        project_id: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        external_id: row.get(6)?,
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<RegisteredModel> {
    Ok(RegisteredModel {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        project_id: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ModelVersion> {
    Ok(ModelVersion {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        project_id: row.get(3)?,
        registered_model_id: row.get(4)?,
        name: row.get(5)?,
        description: row.get(6)?,
        status: parsed(row, 7)?,
        model_framework: row.get(8)?,
        model_framework_version: row.get(9)?,
        container_image: row.get(10)?,
        uri: row.get(11)?,
        labels: labels(row, 12)?,
    })
}

fn inference_service_from_row(row: &Row<'_>) -> rusqlite::Result<InferenceService> {
    Ok(InferenceService {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        project_id: row.get(3)?,
        name: row.get(4)?,
        external_id: row.get(5)?,
        serving_environment_id: row.get(6)?,
        registered_model_id: row.get(7)?,
        desired_state: parsed(row, 8)?,
        current_state: parsed(row, 9)?,
        runtime: row.get(10)?,
        url: row.get(11)?,
        last_error: row.get(12)?,
        labels: labels(row, 13)?,
    })
}

const ISVC_COLUMNS: &str = "
    SELECT id, created_at, updated_at, project_id, name, external_id, serving_environment_id,
           registered_model_id, desired_state, current_state, runtime, url, last_error, labels
    FROM inference_services";

#[async_trait]
impl InferenceServiceRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<()> {
        let isvc = isvc.clone();
        self.call(ctx, move |conn| {
            let labels = encode_labels("inference_services.labels", &isvc.labels)?;
            conn.execute(
                "INSERT INTO inference_services
                     (id, project_id, name, external_id, serving_environment_id, registered_model_id,
                      desired_state, current_state, runtime, url, last_error, labels,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    isvc.id,
                    isvc.project_id,
                    isvc.name,
                    isvc.external_id,
                    isvc.serving_environment_id,
                    isvc.registered_model_id,
                    isvc.desired_state.as_str(),
                    isvc.current_state.as_str(),
                    isvc.runtime,
                    isvc.url,
                    isvc.last_error,
                    labels,
                    isvc.created_at,
                    isvc.updated_at,
                ],
            )
            .on_conflict(WeirError::InferenceServiceNameConflict)?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<InferenceService> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                &format!("{ISVC_COLUMNS} WHERE id = ?1 AND project_id = ?2"),
                params![id, project],
                inference_service_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::InferenceServiceNotFound))
        })
        .await
    }

    async fn update(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<()> {
        let project = ctx.project_id();
        let isvc = isvc.clone();
        self.call(ctx, move |conn| {
            let labels = encode_labels("inference_services.labels", &isvc.labels)?;
            let changed = conn
                .execute(
                    "UPDATE inference_services
                     SET name = ?1, external_id = ?2, desired_state = ?3, current_state = ?4,
                         runtime = ?5, url = ?6, last_error = ?7, labels = ?8, updated_at = ?9
                     WHERE id = ?10 AND project_id = ?11",
                    params![
                        isvc.name,
                        isvc.external_id,
                        isvc.desired_state.as_str(),
                        isvc.current_state.as_str(),
                        isvc.runtime,
                        isvc.url,
                        isvc.last_error,
                        labels,
                        isvc.updated_at,
                        isvc.id,
                        project,
                    ],
                )
                .on_conflict(WeirError::InferenceServiceNameConflict)?;
            expect_changed(changed, WeirError::InferenceServiceNotFound)
        })
        .await
    }
}

#[async_trait]
impl ServingEnvironmentRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, env: &ServingEnvironment) -> Result<()> {
        let env = env.clone();
        self.call(ctx, move |conn| {
            conn.execute(
                "INSERT INTO serving_environments
                     (id, project_id, name, description, external_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    env.id,
                    env.project_id,
                    env.name,
                    env.description,
                    env.external_id,
                    env.created_at,
                    env.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<ServingEnvironment> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                "SELECT id, created_at, updated_at, project_id, name, description, external_id
                 FROM serving_environments WHERE id = ?1 AND project_id = ?2",
                params![id, project],
                environment_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::ServingEnvironmentNotFound))
        })
        .await
    }
}

#[async_trait]
impl RegisteredModelRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, model: &RegisteredModel) -> Result<()> {
        let model = model.clone();
        self.call(ctx, move |conn| {
            conn.execute(
                "INSERT INTO registered_models
                     (id, project_id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    model.id,
                    model.project_id,
                    model.name,
                    model.description,
                    model.created_at,
                    model.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<RegisteredModel> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                "SELECT id, created_at, updated_at, project_id, name, description
                 FROM registered_models WHERE id = ?1 AND project_id = ?2",
                params![id, project],
                model_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::RegisteredModelNotFound))
        })
        .await
    }
}

#[async_trait]
impl ModelVersionRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, version: &ModelVersion) -> Result<()> {
        let version = version.clone();
        self.call(ctx, move |conn| {
            let labels = encode_labels("model_versions.labels", &version.labels)?;
            conn.execute(
                "INSERT INTO model_versions
                     (id, project_id, registered_model_id, name, description, status,
                      model_framework, model_framework_version, container_image, uri, labels,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    version.id,
                    version.project_id,
                    version.registered_model_id,
                    version.name,
                    version.description,
                    version.status.as_str(),
                    version.model_framework,
                    version.model_framework_version,
                    version.container_image,
                    version.uri,
                    labels,
                    version.created_at,
                    version.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<ModelVersion> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            conn.query_row(
                "SELECT id, created_at, updated_at, project_id, registered_model_id, name,
                        description, status, model_framework, model_framework_version,
                        container_image, uri, labels
                 FROM model_versions WHERE id = ?1 AND project_id = ?2",
                params![id, project],
                version_from_row,
            )
            .optional()?
            .ok_or(StoreError::Domain(WeirError::ModelVersionNotFound))
        })
        .await
    }
}

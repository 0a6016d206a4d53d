//! `/ai_service_backends` and `/backends`: pass-through management of the
//! gateway's upstream backends. Namespaces come from `?namespace=`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use weir_core::domain::{AiServiceBackend, ApiSchema, EnvoyBackend};

use crate::dto::{
    CreateAiServiceBackendRequest, CreateEnvoyBackendRequest, ItemList, NamespaceQuery,
    UpdateAiServiceBackendRequest, UpdateEnvoyBackendRequest,
};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Project};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/ai_service_backends",
            get(list_service_backends).post(create_service_backend),
        )
        .route(
            "/ai_service_backends/{name}",
            get(get_service_backend)
                .put(update_service_backend)
                .delete(delete_service_backend),
        )
        .route("/backends", get(list_envoy_backends).post(create_envoy_backend))
        .route(
            "/backends/{name}",
            get(get_envoy_backend)
                .put(update_envoy_backend)
                .delete(delete_envoy_backend),
        )
}

// --- AI service backends ---

async fn list_service_backends(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
) -> ApiResult<Json<ItemList<AiServiceBackend>>> {
    let backends = state
        .upstreams()
        .list_service_backends(&ctx, query.as_deref())
        .await?;
    Ok(Json(ItemList::new(backends)))
}

async fn create_service_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateAiServiceBackendRequest>,
) -> ApiResult<(StatusCode, Json<AiServiceBackend>)> {
    let backend = AiServiceBackend {
        name: req.name,
        namespace: req.namespace,
        schema: req.schema.parse::<ApiSchema>()?,
        backend_ref: req.backend_ref.into(),
        header_mutation: req.header_mutation.filter(|m| !m.is_empty()),
        labels: req.labels,
    };
    let created = state.upstreams().create_service_backend(&ctx, backend).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_service_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
) -> ApiResult<Json<AiServiceBackend>> {
    let backend = state
        .upstreams()
        .get_service_backend(&ctx, query.as_deref(), &name)
        .await?;
    Ok(Json(backend))
}

async fn update_service_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
    ApiJson(req): ApiJson<UpdateAiServiceBackendRequest>,
) -> ApiResult<Json<AiServiceBackend>> {
    let upstreams = state.upstreams();
    let mut backend = upstreams
        .get_service_backend(&ctx, query.as_deref(), &name)
        .await?;
    if let Some(schema) = req.schema {
        backend.schema = schema.parse()?;
    }
    if let Some(mutation) = req.header_mutation {
        backend.header_mutation = Some(mutation).filter(|m| !m.is_empty());
    }
    if let Some(labels) = req.labels {
        backend.labels = labels;
    }
    let updated = upstreams.update_service_backend(&ctx, backend).await?;
    Ok(Json(updated))
}

async fn delete_service_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
) -> ApiResult<StatusCode> {
    state
        .upstreams()
        .delete_service_backend(&ctx, query.as_deref(), &name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Envoy backends ---

async fn list_envoy_backends(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
) -> ApiResult<Json<ItemList<EnvoyBackend>>> {
    let backends = state
        .upstreams()
        .list_envoy_backends(&ctx, query.as_deref())
        .await?;
    Ok(Json(ItemList::new(backends)))
}

async fn create_envoy_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateEnvoyBackendRequest>,
) -> ApiResult<(StatusCode, Json<EnvoyBackend>)> {
    let backend = EnvoyBackend {
        name: req.name,
        namespace: req.namespace,
        endpoints: req.endpoints,
        labels: req.labels,
    };
    let created = state.upstreams().create_envoy_backend(&ctx, backend).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_envoy_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
) -> ApiResult<Json<EnvoyBackend>> {
    let backend = state
        .upstreams()
        .get_envoy_backend(&ctx, query.as_deref(), &name)
        .await?;
    Ok(Json(backend))
}

async fn update_envoy_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
    ApiJson(req): ApiJson<UpdateEnvoyBackendRequest>,
) -> ApiResult<Json<EnvoyBackend>> {
    let upstreams = state.upstreams();
    let mut backend = upstreams
        .get_envoy_backend(&ctx, query.as_deref(), &name)
        .await?;
    if let Some(endpoints) = req.endpoints {
        backend.endpoints = endpoints;
    }
    if let Some(labels) = req.labels {
        backend.labels = labels;
    }
    let updated = upstreams.update_envoy_backend(&ctx, backend).await?;
    Ok(Json(updated))
}

async fn delete_envoy_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<NamespaceQuery>,
) -> ApiResult<StatusCode> {
    state
        .upstreams()
        .delete_envoy_backend(&ctx, query.as_deref(), &name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

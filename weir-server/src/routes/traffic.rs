//! `/traffic_configs`: canary rollouts, A/B variants, promotion, and
//! rollback.

use axum::extract::State;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::dto::{
    AddVariantRequest, BulkUpdateWeightsRequest, CreateTrafficConfigRequest, ListTrafficConfigsQuery,
    ListTrafficConfigsResponse, ListVariantsResponse, StartCanaryRequest, TrafficConfigResponse,
    TrafficVariantResponse, WeightRequest,
};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Project, Synced};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/traffic_configs", get(list_configs).post(create_config))
        .route("/traffic_configs/{id}", get(get_config).delete(delete_config))
        .route("/traffic_configs/{id}/variants", get(list_variants).post(add_variant))
        .route(
            "/traffic_configs/{id}/variants/{name}",
            get(get_variant).patch(update_variant).delete(delete_variant),
        )
        .route("/traffic_configs/{id}/weights", patch(bulk_update_weights))
        .route("/traffic_configs/{id}/promote/{name}", post(promote_variant))
        .route("/traffic_configs/{id}/rollback", post(rollback))
        .route("/traffic_configs/{id}/canary", post(start_canary))
        .route("/traffic_configs/{id}/canary/weight", patch(update_canary_weight))
        .route("/traffic_configs/{id}/canary/promote", post(promote_canary))
}

type ConfigResult = ApiResult<Synced<TrafficConfigResponse>>;

async fn list_configs(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListTrafficConfigsQuery>,
) -> ApiResult<Json<ListTrafficConfigsResponse>> {
    let offset = query.offset;
    let filter = query.into_filter()?;
    let (configs, total) = state.traffic().list_configs(&ctx, &filter).await?;
    Ok(Json(ListTrafficConfigsResponse::new(configs, total, offset)))
}

async fn create_config(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTrafficConfigRequest>,
) -> ConfigResult {
    let outcome = state.traffic().create_config(&ctx, req.into_command()?).await?;
    Ok(Synced::created(outcome.map(Into::into)))
}

async fn get_config(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TrafficConfigResponse>> {
    let config = state.traffic().get_config(&ctx, id).await?;
    Ok(Json(config.into()))
}

async fn delete_config(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Synced<()>> {
    let outcome = state.traffic().delete_config(&ctx, id).await?;
    Ok(Synced::no_content(outcome))
}

async fn list_variants(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ListVariantsResponse>> {
    let variants = state.traffic().list_variants(&ctx, id).await?;
    Ok(Json(ListVariantsResponse {
        config_id: id,
        total: variants.len(),
        variants: variants.into_iter().map(Into::into).collect(),
    }))
}

async fn add_variant(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddVariantRequest>,
) -> ConfigResult {
    let outcome = state.traffic().add_variant(&ctx, id, req.into()).await?;
    Ok(Synced::created(outcome.map(Into::into)))
}

async fn get_variant(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath((id, name)): ApiPath<(Uuid, String)>,
) -> ApiResult<Json<TrafficVariantResponse>> {
    let variant = state.traffic().get_variant(&ctx, id, &name).await?;
    Ok(Json(variant.into()))
}

async fn update_variant(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath((id, name)): ApiPath<(Uuid, String)>,
    ApiJson(req): ApiJson<WeightRequest>,
) -> ConfigResult {
    let outcome = state.traffic().update_variant(&ctx, id, &name, req.weight).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn delete_variant(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath((id, name)): ApiPath<(Uuid, String)>,
) -> ConfigResult {
    let outcome = state.traffic().delete_variant(&ctx, id, &name).await?;
    Ok(Synced::no_content(outcome.map(Into::into)))
}

async fn bulk_update_weights(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<BulkUpdateWeightsRequest>,
) -> ConfigResult {
    let outcome = state.traffic().bulk_update_weights(&ctx, id, &req.weights).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn promote_variant(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath((id, name)): ApiPath<(Uuid, String)>,
) -> ConfigResult {
    let outcome = state.traffic().promote_variant(&ctx, id, &name).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn rollback(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ConfigResult {
    let outcome = state.traffic().rollback(&ctx, id).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn start_canary(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StartCanaryRequest>,
) -> ConfigResult {
    let outcome = state.traffic().start_canary(&ctx, id, req.into()).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn update_canary_weight(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<WeightRequest>,
) -> ConfigResult {
    let outcome = state.traffic().update_canary_weight(&ctx, id, req.weight).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn promote_canary(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ConfigResult {
    let outcome = state.traffic().promote_canary(&ctx, id).await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

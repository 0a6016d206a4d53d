//! `/virtual_models`: public model names and their weighted backends.

use axum::extract::State;
use axum::routing::{get, patch};
use axum::{Json, Router};
use uuid::Uuid;

use crate::dto::{
    AddBackendRequest, CreateVirtualModelRequest, ItemList, UpdateBackendRequest,
    VirtualModelBackendResponse, VirtualModelResponse,
};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, Project, Synced};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/virtual_models", get(list).post(create))
        .route("/virtual_models/{name}", get(get_one).delete(delete))
        .route("/virtual_models/{name}/backends", get(list_backends).post(add_backend))
        .route(
            "/virtual_models/{name}/backends/{backend_id}",
            patch(update_backend).delete(delete_backend),
        )
}

async fn list(
    Project(ctx): Project,
    State(state): State<AppState>,
) -> ApiResult<Json<ItemList<VirtualModelResponse>>> {
    let models = state.virtual_models().list(&ctx).await?;
    Ok(Json(ItemList::new(models)))
}

async fn create(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateVirtualModelRequest>,
) -> ApiResult<Synced<VirtualModelResponse>> {
    let outcome = state.virtual_models().create(&ctx, req.into()).await?;
    Ok(Synced::created(outcome.map(Into::into)))
}

async fn get_one(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<VirtualModelResponse>> {
    let vm = state.virtual_models().get(&ctx, &name).await?;
    Ok(Json(vm.into()))
}

async fn delete(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Synced<()>> {
    let outcome = state.virtual_models().delete(&ctx, &name).await?;
    Ok(Synced::no_content(outcome))
}

async fn list_backends(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<ItemList<VirtualModelBackendResponse>>> {
    let backends = state.virtual_models().list_backends(&ctx, &name).await?;
    Ok(Json(ItemList::new(backends)))
}

async fn add_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiJson(req): ApiJson<AddBackendRequest>,
) -> ApiResult<Synced<VirtualModelResponse>> {
    let outcome = state.virtual_models().add_backend(&ctx, &name, req.into()).await?;
    Ok(Synced::created(outcome.map(Into::into)))
}

async fn update_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath((name, backend_id)): ApiPath<(String, Uuid)>,
    ApiJson(req): ApiJson<UpdateBackendRequest>,
) -> ApiResult<Synced<VirtualModelResponse>> {
    let outcome = state
        .virtual_models()
        .update_backend(&ctx, &name, backend_id, req.into())
        .await?;
    Ok(Synced::ok(outcome.map(Into::into)))
}

async fn delete_backend(
    Project(ctx): Project,
    State(state): State<AppState>,
    ApiPath((name, backend_id)): ApiPath<(String, Uuid)>,
) -> ApiResult<Synced<VirtualModelResponse>> {
    let outcome = state
        .virtual_models()
        .delete_backend(&ctx, &name, backend_id)
        .await?;
    Ok(Synced::no_content(outcome.map(Into::into)))
}

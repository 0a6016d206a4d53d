//! HTTP routing.

pub mod traffic;
pub mod upstream;
pub mod virtual_models;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use weir_core::RequestContext;

use crate::state::AppState;

/// Prefix for every API route.
pub const API_BASE: &str = "/api/v1/model-registry";

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(traffic::routes())
        .merge(virtual_models::routes())
        .merge(upstream::routes());

    Router::new()
        .route("/healthz", get(healthz))
        .nest(API_BASE, api)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %req.method(),
                        uri = %req.uri(),
                        request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Liveness plus a store round trip.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let ping = match RequestContext::new(Uuid::new_v4()) {
        Ok(ctx) => state.services.health.ping(&ctx.with_timeout(state.request_timeout)).await,
        Err(err) => Err(err),
    };
    match ping {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": err.to_string() })),
            )
        }
    }
}

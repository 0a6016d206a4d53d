//! Request extractors and the sync-aware response wrapper.

use axum::extract::{FromRequest, FromRequestParts, Path, Query};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use weir_core::{Outcome, RequestContext, SyncReport};

use crate::error::ApiError;
use crate::state::AppState;

/// Tenant header every API request must carry.
pub const PROJECT_ID_HEADER: HeaderName = HeaderName::from_static("project-id");
pub const RUNTIME_SYNC_HEADER: HeaderName = HeaderName::from_static("x-weir-runtime-sync");
pub const GATEWAY_SYNC_HEADER: HeaderName = HeaderName::from_static("x-weir-gateway-sync");

/// Request context scoped to the `Project-ID` header, with the configured
/// request deadline.
pub struct Project(pub RequestContext);

impl FromRequestParts<AppState> for Project {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(&PROJECT_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        let ctx = RequestContext::from_header(raw)?.with_timeout(state.request_timeout);
        Ok(Self(ctx))
    }
}

#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// A mutation result: the value as JSON plus the runtime and gateway sync
/// effects as response headers.
pub struct Synced<T> {
    status: StatusCode,
    outcome: Outcome<T>,
    body: bool,
}

impl<T> Synced<T> {
    pub fn ok(outcome: Outcome<T>) -> Self {
        Self {
            status: StatusCode::OK,
            outcome,
            body: true,
        }
    }

    pub fn created(outcome: Outcome<T>) -> Self {
        Self {
            status: StatusCode::CREATED,
            outcome,
            body: true,
        }
    }

    /// `204 No Content`; only the sync headers are sent.
    pub fn no_content(outcome: Outcome<T>) -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            outcome,
            body: false,
        }
    }
}

fn sync_headers(sync: &SyncReport) -> [(HeaderName, HeaderValue); 2] {
    [
        (
            RUNTIME_SYNC_HEADER,
            HeaderValue::from_static(sync.runtime.as_str()),
        ),
        (
            GATEWAY_SYNC_HEADER,
            HeaderValue::from_static(sync.gateway.as_str()),
        ),
    ]
}

impl<T: Serialize> IntoResponse for Synced<T> {
    fn into_response(self) -> Response {
        let headers = sync_headers(&self.outcome.sync);
        if self.body {
            (self.status, headers, Json(self.outcome.value)).into_response()
        } else {
            (self.status, headers).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::ExternalEffect;

    #[test]
    fn test_sync_headers() {
        let outcome = Outcome::new(
            serde_json::json!({"id": 1}),
            SyncReport {
                runtime: ExternalEffect::Applied,
                gateway: ExternalEffect::Failed("connection refused".into()),
            },
        );
        let response = Synced::created(outcome).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[RUNTIME_SYNC_HEADER], "applied");
        assert_eq!(response.headers()[GATEWAY_SYNC_HEADER], "failed");
    }

    #[test]
    fn test_no_content_has_no_body() {
        let response = Synced::no_content(Outcome::new((), SyncReport::default())).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[GATEWAY_SYNC_HEADER], "skipped");
    }
}

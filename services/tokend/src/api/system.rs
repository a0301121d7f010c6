//! System/health API handlers.
//!
//! # Key invariants and assumptions
//! - Health checks must be fast and side-effect free.
use crate::api::error::{ApiError, api_internal};
use crate::api::openapi::ApiDoc;
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use utoipa::OpenApi;

#[utoipa::path(
    get,
    path = "/v1/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Service health", body = HealthStatus)
    )
)]
/// Ping the credential store and report `ok` if it answers.
///
/// # Errors
/// - Returns 500 if the storage health check fails.
pub(crate) async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    if let Err(err) = state.store.health_check().await {
        return Err(api_internal("storage unavailable", &err));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}

/// Serve the generated OpenAPI document.
pub(crate) async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

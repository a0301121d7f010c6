//! Operator endpoints for seeding clients and revoking credentials.
//!
//! # Purpose
//! Routes here sit behind the static operator credential gate. They register
//! clients and apply permanent revocations.
//!
//! # Key invariants
//! - Revocations are irreversible; repeating one is a no-op that still
//!   answers `204`.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::tokens::request_origin;
use crate::api::types::{
    ClientCreateRequest, ClientResponse, ClientRevocationRequest, ErrorResponse,
    RefreshTokenRevocationRequest,
};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

#[utoipa::path(
    post,
    path = "/admin/clients",
    tag = "admin",
    security(("operator" = [])),
    request_body = ClientCreateRequest,
    responses(
        (status = 201, description = "Client registered", body = ClientResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 409, description = "Client already exists", body = ErrorResponse)
    )
)]
pub async fn create_client(
    State(state): State<AppState>,
    Json(body): Json<ClientCreateRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(api_validation_error("name is required"));
    }
    if body.client_secret.is_empty() {
        return Err(api_validation_error("client_secret is required"));
    }
    let client = state
        .service
        .register_client(body.name.trim(), &body.client_secret, body.roles)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ClientResponse {
            name: client.name,
            roles: client.roles,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/admin/revocations/clients",
    tag = "admin",
    security(("operator" = [])),
    request_body = ClientRevocationRequest,
    responses(
        (status = 204, description = "Client secret and its refresh tokens revoked"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Client not found", body = ErrorResponse)
    )
)]
pub async fn revoke_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ClientRevocationRequest>,
) -> Result<StatusCode, ApiError> {
    let origin = request_origin(&headers, None, None);
    let service = &state.service;
    service
        .revocation()
        .revoke_client(service.policy().deadline(), &body.name, &origin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/revocations/refresh-tokens",
    tag = "admin",
    security(("operator" = [])),
    request_body = RefreshTokenRevocationRequest,
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn revoke_refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshTokenRevocationRequest>,
) -> Result<StatusCode, ApiError> {
    if body.refresh_token.is_empty() {
        return Err(api_validation_error("refresh_token is required"));
    }
    let origin = request_origin(&headers, None, None);
    let service = &state.service;
    service
        .revocation()
        .revoke_refresh_token(service.policy().deadline(), &body.refresh_token, &origin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

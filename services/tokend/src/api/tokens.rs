//! Token issuance and refresh handlers.
//!
//! # Purpose
//! Public endpoints that exchange a client secret for a session plus refresh
//! credential, and a refresh credential for a new session.
//!
//! # Security considerations
//! - Neither endpoint requires prior authentication; the secret or refresh
//!   token in the body is the credential.
//! - Responses and logs never include the presented secret or token.
use crate::api::error::ApiError;
use crate::api::types::{
    ErrorResponse, RefreshRequest, RefreshResponse, TOKEN_TYPE_BEARER, TokenRequest, TokenResponse,
};
use crate::app::AppState;
use crate::auth::CredentialError;
use crate::model::Origin;
use crate::observability::TOKEN_REQUESTS_TOTAL;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

const FORWARDED_FOR: &str = "x-forwarded-for";

#[utoipa::path(
    post,
    path = "/token",
    tag = "tokens",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Session and refresh credentials issued", body = TokenResponse),
        (status = 401, description = "Unknown client secret", body = ErrorResponse),
        (status = 403, description = "Client revoked", body = ErrorResponse),
        (status = 503, description = "Credential store timed out", body = ErrorResponse)
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let origin = request_origin(&headers, body.ip, body.user_agent);
    let result = state.service.issue_token(&body.client_secret, &origin).await;
    record_outcome("token", &result);
    let issued = result?;
    Ok(Json(TokenResponse {
        session_token: issued.session_token,
        refresh_token: issued.refresh_token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: issued.session_expires_in,
        refresh_expires_at: issued.refresh_expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/token/refresh",
    tag = "tokens",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New session credential", body = RefreshResponse),
        (status = 401, description = "Invalid, revoked, or expired refresh token", body = ErrorResponse),
        (status = 403, description = "Client revoked", body = ErrorResponse),
        (status = 404, description = "Owning client no longer exists", body = ErrorResponse),
        (status = 503, description = "Credential store timed out", body = ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let origin = request_origin(&headers, body.ip, body.user_agent);
    let result = state.service.refresh_token(&body.refresh_token, &origin).await;
    record_outcome("refresh", &result);
    let refreshed = result?;
    Ok(Json(RefreshResponse {
        session_token: refreshed.session_token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: refreshed.expires_in,
    }))
}

/// Resolve the request origin, preferring values supplied in the body.
pub(crate) fn request_origin(
    headers: &HeaderMap,
    ip: Option<String>,
    user_agent: Option<String>,
) -> Origin {
    let ip = ip.filter(|value| !value.is_empty()).unwrap_or_else(|| {
        header_str(headers, FORWARDED_FOR)
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    });
    let user_agent = user_agent
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            header_str(headers, USER_AGENT.as_str())
                .map(str::to_string)
                .unwrap_or_default()
        });
    Origin::new(ip, user_agent)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn record_outcome<T>(endpoint: &'static str, result: &Result<T, CredentialError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(CredentialError::InvalidClient) => "invalid_client",
        Err(CredentialError::RevokedClient) => "revoked_client",
        Err(CredentialError::InvalidToken) => "invalid_token",
        Err(CredentialError::RevokedToken) => "revoked_token",
        Err(CredentialError::Expired) => "expired_token",
        Err(CredentialError::ClientNotFound) => "client_not_found",
        Err(CredentialError::Timeout) => "timeout",
        Err(_) => "error",
    };
    if let Err(err) = result {
        tracing::debug!(endpoint, outcome, error = %err, "token request rejected");
    }
    metrics::counter!(
        TOKEN_REQUESTS_TOTAL,
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_prefers_body_values() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("10.0.0.9"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));
        let origin = request_origin(
            &headers,
            Some("192.0.2.1".to_string()),
            Some("sdk/2".to_string()),
        );
        assert_eq!(origin, Origin::new("192.0.2.1", "sdk/2"));
    }

    #[test]
    fn origin_falls_back_to_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));
        let origin = request_origin(&headers, None, Some(String::new()));
        assert_eq!(origin, Origin::new("203.0.113.7", "curl/8"));
    }

    #[test]
    fn origin_defaults_to_empty() {
        let origin = request_origin(&HeaderMap::new(), None, None);
        assert_eq!(origin, Origin::default());
    }
}

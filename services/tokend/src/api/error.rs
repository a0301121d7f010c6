//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so every endpoint returns the
//! same `{code, message, request_id}` shape, and maps [`CredentialError`]
//! outcomes onto status codes.
//!
//! # Key invariants and assumptions
//! - Error responses carry a stable `code` and a human-readable `message`.
//! - Status codes align with the error category.
//!
//! # Security considerations
//! - Messages never echo secrets or tokens.
//! - Internal errors log details server-side but return generic messages.
use crate::api::types::ErrorResponse;
use crate::auth::CredentialError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Invariants
/// - `status` must match the semantics of `body.code`.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use tokend::api::error::ApiError;
/// use tokend::api::types::ErrorResponse;
///
/// let err = ApiError {
///     status: StatusCode::UNAUTHORIZED,
///     body: ErrorResponse {
///         code: "invalid_token".to_string(),
///         message: "invalid refresh token".to_string(),
///         request_id: None,
///     },
/// };
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

/// Build a 409 Conflict error with a caller-provided code.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Build a 404 Not Found error.
pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 500 Internal Server Error from a store error.
///
/// Logs the store error and returns a generic internal error response.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "tokend storage error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Build a 500 Internal Server Error without a store error.
pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Build a 503 error for a missed store deadline.
pub fn api_timeout() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "timeout",
        "credential store did not respond in time",
    )
}

/// Build a 401 Unauthorized error.
pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

/// Build a 400 Bad Request validation error.
pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidClient => api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                "invalid client credentials",
            ),
            CredentialError::RevokedClient => api_error(
                StatusCode::FORBIDDEN,
                "revoked_client",
                "client has been revoked",
            ),
            CredentialError::InvalidToken => api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "invalid refresh token",
            ),
            CredentialError::RevokedToken => api_error(
                StatusCode::UNAUTHORIZED,
                "revoked_token",
                "refresh token has been revoked",
            ),
            CredentialError::Expired => api_error(
                StatusCode::UNAUTHORIZED,
                "expired_token",
                "refresh token has expired",
            ),
            CredentialError::ClientNotFound => api_not_found("client not found"),
            CredentialError::ClientExists => {
                api_conflict("already_exists", "client already exists")
            }
            CredentialError::Timeout => {
                tracing::warn!("credential store deadline exceeded");
                api_timeout()
            }
            CredentialError::Storage(err) => api_internal("credential store failure", &err),
            CredentialError::Signing(err) => {
                tracing::error!(error = ?err, "session signing failed");
                api_internal_message("failed to issue session token")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionError;

    #[test]
    fn api_error_helpers_build_expected_codes() {
        let not_found = api_not_found("missing");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.body.code, "not_found");

        let conflict = api_conflict("already_exists", "conflict");
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.body.code, "already_exists");

        let internal = api_internal_message("oops");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.body.code, "internal");

        let unauthorized = api_unauthorized("nope");
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unauthorized.body.code, "unauthorized");

        let validation = api_validation_error("bad");
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.body.code, "validation_error");
    }

    #[test]
    fn credential_errors_map_to_wire_codes() {
        let cases = [
            (CredentialError::InvalidClient, StatusCode::UNAUTHORIZED, "invalid_client"),
            (CredentialError::RevokedClient, StatusCode::FORBIDDEN, "revoked_client"),
            (CredentialError::InvalidToken, StatusCode::UNAUTHORIZED, "invalid_token"),
            (CredentialError::RevokedToken, StatusCode::UNAUTHORIZED, "revoked_token"),
            (CredentialError::Expired, StatusCode::UNAUTHORIZED, "expired_token"),
            (CredentialError::ClientNotFound, StatusCode::NOT_FOUND, "not_found"),
            (CredentialError::ClientExists, StatusCode::CONFLICT, "already_exists"),
            (CredentialError::Timeout, StatusCode::SERVICE_UNAVAILABLE, "timeout"),
            (
                CredentialError::Storage(StoreError::Unexpected(anyhow::anyhow!("boom"))),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
            (
                CredentialError::Signing(SessionError::MalformedToken),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.body.code, code);
        }
    }

    #[test]
    fn store_details_stay_out_of_messages() {
        let err = StoreError::Unexpected(anyhow::anyhow!("password=hunter2"));
        let api = ApiError::from(CredentialError::Storage(err));
        assert!(!api.body.message.contains("hunter2"));
    }
}

//! Bearer-protected session introspection.
use crate::api::types::{ErrorResponse, SessionInfo};
use crate::auth::AuthContext;
use axum::Json;
use axum::extract::Extension;

#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "tokens",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Identity carried by the session token", body = SessionInfo),
        (status = 401, description = "Missing or invalid session token", body = ErrorResponse)
    )
)]
pub async fn current_session(Extension(auth): Extension<AuthContext>) -> Json<SessionInfo> {
    Json(SessionInfo {
        subject: auth.subject,
        roles: auth.roles,
    })
}

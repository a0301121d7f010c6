//! Authorization gate middleware.
//!
//! # Purpose
//! Two axum middlewares, attached per route group with
//! `axum::middleware::from_fn_with_state`:
//! - [`require_session`] accepts `Authorization: Bearer <session token>` and
//!   attaches an [`AuthContext`] to the request.
//! - [`require_operator`] accepts `Authorization: Basic base64(user:pass)`
//!   matching the configured [`OperatorCredential`].
//!
//! # Security considerations
//! Every rejection produces the same `401 unauthorized` body. The precise
//! cause is logged at debug level only. Operator credentials are compared in
//! constant time.
use crate::api::error::api_unauthorized;
use crate::auth::secrets::constant_time_eq;
use crate::auth::session::SessionIssuer;
use crate::config::OperatorCredential;
use crate::observability::GATE_REJECTIONS_TOTAL;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const POLICY_SESSION: &str = "session";
pub const POLICY_OPERATOR: &str = "operator";

/// Authenticated caller identity, available to handlers behind
/// [`require_session`] as `Extension<AuthContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub subject: String,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|granted| granted == role)
    }
}

pub async fn require_session(
    State(issuer): State<SessionIssuer>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = credentials(request.headers(), "Bearer") else {
        return reject(POLICY_SESSION, "missing or malformed bearer header");
    };
    let identity = match issuer.validate_session(token) {
        Ok(identity) => identity,
        Err(err) => return reject(POLICY_SESSION, err.label()),
    };
    request.extensions_mut().insert(AuthContext {
        subject: identity.subject,
        roles: identity.roles,
    });
    next.run(request).await
}

pub async fn require_operator(
    State(operator): State<OperatorCredential>,
    request: Request,
    next: Next,
) -> Response {
    let Some(encoded) = credentials(request.headers(), "Basic") else {
        return reject(POLICY_OPERATOR, "missing or malformed basic header");
    };
    let Ok(presented) = STANDARD.decode(encoded) else {
        return reject(POLICY_OPERATOR, "basic credentials are not base64");
    };
    let expected = format!("{}:{}", operator.username, operator.password);
    if !constant_time_eq(&presented, expected.as_bytes()) {
        return reject(POLICY_OPERATOR, "operator credential mismatch");
    }
    next.run(request).await
}

/// Extract the credentials following `scheme` from the Authorization header.
/// The scheme is case-insensitive; empty credentials count as absent.
fn credentials<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (presented, rest) = value.split_once(' ')?;
    if !presented.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let rest = rest.trim();
    if rest.is_empty() { None } else { Some(rest) }
}

fn reject(policy: &'static str, cause: &str) -> Response {
    tracing::debug!(policy, cause, "request rejected by gate");
    metrics::counter!(GATE_REJECTIONS_TOTAL, "policy" => policy).increment(1);
    api_unauthorized("missing or invalid credentials").into_response()
}

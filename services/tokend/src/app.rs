//! tokend HTTP application wiring.
//!
//! # Purpose
//! Builds the axum router, attaches the per-group authorization gates and the
//! tracing layer, and defines the shared application state.
//!
//! # Notes
//! `AppState` is immutable after construction. The signing secret and the
//! operator credential are handed to the gates by value when the router is
//! built.
use crate::api;
use crate::auth::gate::{require_operator, require_session};
use crate::auth::{CredentialPolicy, CredentialService, SessionIssuer};
use crate::config::{OperatorCredential, TokendConfig};
use crate::observability;
use crate::store::CredentialStore;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub service: CredentialService,
    pub issuer: SessionIssuer,
    pub operator: OperatorCredential,
}

impl AppState {
    /// Assemble state around an already-open store.
    pub fn new(config: &TokendConfig, store: Arc<dyn CredentialStore>) -> Self {
        let issuer = SessionIssuer::new(&config.signing);
        let policy = CredentialPolicy::default()
            .with_store_timeout(Duration::from_millis(config.store_timeout_ms));
        Self {
            service: CredentialService::new(store.clone(), issuer.clone(), policy),
            store,
            issuer,
            operator: config.operator.clone(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    let session_routes = Router::new()
        .route("/v1/session", get(api::session::current_session))
        .route_layer(from_fn_with_state(state.issuer.clone(), require_session));

    let operator_routes = Router::new()
        .route("/admin/clients", post(api::admin::create_client))
        .route(
            "/admin/revocations/clients",
            post(api::admin::revoke_client),
        )
        .route(
            "/admin/revocations/refresh-tokens",
            post(api::admin::revoke_refresh_token),
        )
        .route_layer(from_fn_with_state(state.operator.clone(), require_operator));

    Router::new()
        .route("/token", post(api::tokens::issue_token))
        .route("/token/refresh", post(api::tokens::refresh_token))
        .route("/v1/system/health", get(api::system::system_health))
        .route("/v1/openapi.json", get(api::system::openapi_json))
        .merge(session_routes)
        .merge(operator_routes)
        .layer(trace_layer)
        .with_state(state)
}

//! Logging, tracing, and metrics for tokend.
//!
//! # Purpose
//! Installs the tracing subscriber, the W3C trace-context propagator used by the
//! HTTP trace layer, and the Prometheus recorder that backs the `/metrics`
//! listener.
//!
//! # Notes
//! - Credential audit lines use the `audit` tracing target, so they can be
//!   routed separately with `RUST_LOG=audit=info`.
//! - Spans are exported over OTLP only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! - Initialization is guarded by `OnceLock` so tests can call it repeatedly.
use anyhow::Context;
use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static OBS_INIT: OnceLock<()> = OnceLock::new();
static PROPAGATOR_INIT: OnceLock<()> = OnceLock::new();

pub const CREDENTIAL_EVENTS_TOTAL: &str = "tokend_credential_events_total";
pub const TOKEN_REQUESTS_TOTAL: &str = "tokend_token_requests_total";
pub const GATE_REJECTIONS_TOTAL: &str = "tokend_gate_rejections_total";

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
// sqlx logs every statement at info.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init_observability(service_name: &str) -> anyhow::Result<PrometheusHandle> {
    OBS_INIT.get_or_init(|| {
        install_propagator();
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer());
        match otlp_tracer_provider(service_name) {
            Some(provider) => {
                let tracer = provider.tracer(service_name.to_string());
                let _ = registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });

    let handle = install_metrics_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!(
        CREDENTIAL_EVENTS_TOTAL,
        "Committed credential transitions by kind and action"
    );
    metrics::describe_counter!(
        TOKEN_REQUESTS_TOTAL,
        "Token endpoint requests by endpoint and outcome"
    );
    metrics::describe_counter!(
        GATE_REJECTIONS_TOTAL,
        "Requests rejected by an authorization gate"
    );
}

fn otlp_tracer_provider(service_name: &str) -> Option<SdkTracerProvider> {
    std::env::var_os(OTLP_ENDPOINT_ENV)?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("tokend: OTLP exporter disabled: {err}");
            return None;
        }
    };
    let resource = Resource::builder_empty()
        .with_attributes(service_resource(service_name))
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

fn service_resource(service_name: &str) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_string())];
    if let Ok(value) =
        std::env::var("TOKEND_SERVICE_INSTANCE_ID").or_else(|_| std::env::var("HOSTNAME"))
    {
        attrs.push(KeyValue::new("service.instance.id", value));
    }
    attrs
}

fn install_propagator() {
    PROPAGATOR_INIT.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());
    });
}

/// Parent context for a request span, taken from its `traceparent` header.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|prop| prop.extract(&HeaderMapExtractor(headers)))
}

struct HeaderMapExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

/// Serve `/metrics` on its own listener, away from the credential API.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, metrics_router(handle).into_make_service()).await
}

fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("install metrics recorder")?;
    let _ = METRICS_HANDLE.set(handle.clone());
    Ok(handle)
}

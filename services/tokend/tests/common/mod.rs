#![allow(dead_code)]

use axum::Router;
use std::sync::Arc;
use tokend::app::{AppState, build_router};
use tokend::config::{OperatorCredential, SigningConfig, StorageBackend, TokendConfig};
use tokend::store::memory::InMemoryStore;

pub const OPERATOR_USER: &str = "ops";
pub const OPERATOR_PASSWORD: &str = "hunter2";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn test_config() -> TokendConfig {
    TokendConfig {
        bind_addr: "127.0.0.1:0".parse().expect("bind"),
        metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
        signing: SigningConfig {
            secret: b"integration-test-signing-secret-0123456789".to_vec(),
            issuer: "tokend".to_string(),
            audience: "tokend-api".to_string(),
        },
        operator: OperatorCredential {
            username: OPERATOR_USER.to_string(),
            password: OPERATOR_PASSWORD.to_string(),
        },
        storage: StorageBackend::Memory,
        postgres: None,
        store_timeout_ms: 2_000,
    }
}

pub struct TestApp {
    pub store: InMemoryStore,
    pub state: AppState,
    pub router: Router,
}

pub fn test_app() -> TestApp {
    let store = InMemoryStore::new();
    let state = AppState::new(&test_config(), Arc::new(store.clone()));
    TestApp {
        store,
        router: build_router(state.clone()),
        state,
    }
}

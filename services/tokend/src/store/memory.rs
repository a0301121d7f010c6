//! In-memory implementation of the credential store.
//!
//! # Purpose
//! Implements [`CredentialStore`] with plain collections guarded by a single
//! `tokio::sync::RwLock`. It exists for:
//! - local development and tests (no external dependencies)
//! - deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: every mutation, including the whole
//!   retire-then-insert rotation, runs under one write lock with no await
//!   points inside the critical section, so concurrent rotations for the same
//!   client are serialized and a deadline can never interrupt one halfway.
//! - **No multi-node coordination**: multiple instances each have independent
//!   state.
use super::{CredentialStore, Deadline, Rotation, StoreError, StoreResult};
use crate::model::{
    AuditEvent, Client, Origin, REASON_CLIENT_REVOKED, REASON_ROTATION, RefreshCredential,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    /// Clients keyed by secret hash.
    clients: HashMap<String, Client>,
    /// Client name -> secret hash.
    client_names: HashMap<String, String>,
    /// Refresh credentials keyed by token value.
    refresh_tokens: HashMap<String, RefreshCredential>,
    revoked_client_secrets: HashSet<String>,
    revoked_refresh_tokens: HashSet<String>,
    token_log: Vec<AuditEvent>,
}

impl MemoryState {
    fn active_for(&self, secret_hash: &str, now: DateTime<Utc>) -> Option<&RefreshCredential> {
        self.refresh_tokens
            .values()
            .filter(|credential| credential.client_secret_hash == secret_hash)
            .filter(|credential| credential.is_active_at(now))
            .max_by_key(|credential| credential.created_at)
    }

    fn retire(&mut self, token: &str, event: AuditEvent) -> Option<RefreshCredential> {
        let removed = self.refresh_tokens.remove(token);
        self.revoked_refresh_tokens.insert(token.to_string());
        self.token_log.push(event);
        removed
    }
}

/// In-memory credential store.
///
/// Cloning shares the underlying state, so one store can back several routers
/// in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every refresh credential row currently held for a client, expired or not.
    pub async fn refresh_tokens_for(&self, secret_hash: &str) -> Vec<RefreshCredential> {
        self.state
            .read()
            .await
            .refresh_tokens
            .values()
            .filter(|credential| credential.client_secret_hash == secret_hash)
            .cloned()
            .collect()
    }

    pub async fn revoked_refresh_token_count(&self) -> usize {
        self.state.read().await.revoked_refresh_tokens.len()
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.read().await.token_log.clone()
    }

    /// Insert a refresh credential row directly, bypassing rotation. Used to
    /// stage expired or orphaned rows.
    pub async fn insert_refresh_token(&self, credential: RefreshCredential) {
        self.state
            .write()
            .await
            .refresh_tokens
            .insert(credential.token.clone(), credential);
    }

    /// Drop a client row while leaving its refresh credentials in place.
    pub async fn remove_client(&self, name: &str) {
        let mut state = self.state.write().await;
        if let Some(hash) = state.client_names.remove(name) {
            state.clients.remove(&hash);
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn create_client(&self, deadline: Deadline, client: Client) -> StoreResult<Client> {
        deadline
            .run(async {
                let mut state = self.state.write().await;
                if state.client_names.contains_key(&client.name)
                    || state.clients.contains_key(&client.secret_hash)
                {
                    return Err(StoreError::Conflict("client exists".into()));
                }
                state
                    .client_names
                    .insert(client.name.clone(), client.secret_hash.clone());
                state
                    .clients
                    .insert(client.secret_hash.clone(), client.clone());
                Ok(client)
            })
            .await
    }

    async fn find_client_by_secret_hash(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> StoreResult<Client> {
        deadline
            .run(async {
                self.state
                    .read()
                    .await
                    .clients
                    .get(secret_hash)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound("client".into()))
            })
            .await
    }

    async fn find_client_by_name(&self, deadline: Deadline, name: &str) -> StoreResult<Client> {
        deadline
            .run(async {
                let state = self.state.read().await;
                state
                    .client_names
                    .get(name)
                    .and_then(|hash| state.clients.get(hash))
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound("client".into()))
            })
            .await
    }

    async fn is_client_secret_revoked(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> StoreResult<bool> {
        deadline
            .run(async {
                Ok(self
                    .state
                    .read()
                    .await
                    .revoked_client_secrets
                    .contains(secret_hash))
            })
            .await
    }

    async fn is_refresh_token_revoked(
        &self,
        deadline: Deadline,
        token: &str,
    ) -> StoreResult<bool> {
        deadline
            .run(async {
                Ok(self
                    .state
                    .read()
                    .await
                    .revoked_refresh_tokens
                    .contains(token))
            })
            .await
    }

    async fn find_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
    ) -> StoreResult<RefreshCredential> {
        deadline
            .run(async {
                self.state
                    .read()
                    .await
                    .refresh_tokens
                    .get(token)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound("refresh token".into()))
            })
            .await
    }

    async fn active_refresh_token(
        &self,
        deadline: Deadline,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshCredential> {
        deadline
            .run(async {
                self.state
                    .read()
                    .await
                    .active_for(secret_hash, now)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound("refresh token".into()))
            })
            .await
    }

    async fn rotate_refresh_token(
        &self,
        deadline: Deadline,
        rotation: Rotation,
    ) -> StoreResult<Option<RefreshCredential>> {
        deadline
            .run(async {
                let mut state = self.state.write().await;
                let owner = rotation.replacement.client_secret_hash.clone();
                if state.revoked_client_secrets.contains(&owner) {
                    return Err(StoreError::Revoked("client secret".into()));
                }
                if state.refresh_tokens.contains_key(&rotation.replacement.token) {
                    return Err(StoreError::Conflict("refresh token exists".into()));
                }
                // Everything below runs without yielding, so it commits as a unit.
                let active = state.active_for(&owner, rotation.now).cloned();
                let retired = match active {
                    Some(active) => {
                        let event = AuditEvent::refresh_revoked(
                            &owner,
                            &active.token,
                            &rotation.origin,
                            REASON_ROTATION,
                            rotation.now,
                        );
                        state.retire(&active.token, event)
                    }
                    None => None,
                };
                state.refresh_tokens.insert(
                    rotation.replacement.token.clone(),
                    rotation.replacement.clone(),
                );
                state.token_log.extend(rotation.events);
                Ok(retired)
            })
            .await
    }

    async fn revoke_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
        event: AuditEvent,
    ) -> StoreResult<()> {
        deadline
            .run(async {
                let mut state = self.state.write().await;
                if state.revoked_refresh_tokens.contains(token) {
                    return Ok(());
                }
                state.retire(token, event);
                Ok(())
            })
            .await
    }

    async fn revoke_client_secret(
        &self,
        deadline: Deadline,
        secret_hash: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        deadline
            .run(async {
                let mut state = self.state.write().await;
                state.revoked_client_secrets.insert(secret_hash.to_string());
                let owned: Vec<String> = state
                    .refresh_tokens
                    .values()
                    .filter(|credential| credential.client_secret_hash == secret_hash)
                    .map(|credential| credential.token.clone())
                    .collect();
                for token in &owned {
                    let event = AuditEvent::refresh_revoked(
                        secret_hash,
                        token,
                        origin,
                        REASON_CLIENT_REVOKED,
                        now,
                    );
                    state.retire(token, event);
                }
                Ok(owned)
            })
            .await
    }

    async fn append_audit_events(
        &self,
        deadline: Deadline,
        events: Vec<AuditEvent>,
    ) -> StoreResult<()> {
        deadline
            .run(async {
                self.state.write().await.token_log.extend(events);
                Ok(())
            })
            .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

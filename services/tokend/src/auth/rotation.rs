//! Credential issuance and refresh rotation.
//!
//! # Purpose
//! [`CredentialService`] turns a raw client secret into a session credential
//! plus a fresh refresh credential, and turns a refresh credential into a new
//! session credential.
//!
//! # Key invariants
//! - A refresh credential moves `Active -> Retired` (replaced by a newer
//!   issuance) or `Active -> Revoked` and never returns to `Active`.
//! - After an issuance commits, the client holds exactly one active refresh
//!   credential. Retiring the old one, inserting the new one, and the audit
//!   rows are a single store transaction.
//! - Revocation marks are consulted before any other lookup.
//! - Audit and metrics side effects are emitted only after commit.
//!
//! # Cancellation
//! Each operation derives one [`Deadline`] from the policy and passes it to
//! every store call it makes. Dropping the returned future abandons the
//! operation without partial writes.
use crate::auth::audit::AuditLogger;
use crate::auth::revocation::RevocationRegistry;
use crate::auth::secrets::{generate_refresh_token, hash_client_secret};
use crate::auth::session::{SessionError, SessionIssuer};
use crate::model::{Client, Origin, REASON_ROTATION, RefreshCredential};
use crate::store::{CredentialStore, Deadline, Rotation, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid client credentials")]
    InvalidClient,
    #[error("client has been revoked")]
    RevokedClient,
    #[error("invalid refresh token")]
    InvalidToken,
    #[error("refresh token has been revoked")]
    RevokedToken,
    #[error("refresh token has expired")]
    Expired,
    #[error("client not found")]
    ClientNotFound,
    #[error("client already exists")]
    ClientExists,
    #[error("credential store deadline exceeded")]
    Timeout,
    #[error("credential store failure")]
    Storage(#[source] StoreError),
    #[error("session signing failure")]
    Signing(#[from] SessionError),
}

impl From<StoreError> for CredentialError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Timeout => CredentialError::Timeout,
            other => CredentialError::Storage(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    pub session_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Budget for all store calls made by one operation.
    pub store_timeout: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            store_timeout: Duration::from_millis(crate::config::DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl CredentialPolicy {
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.store_timeout)
    }

    fn refresh_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(self.refresh_ttl.as_secs() as i64)
    }
}

/// Result of a successful initial issuance.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub session_token: String,
    pub refresh_token: String,
    pub session_expires_in: u64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub session_token: String,
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    issuer: SessionIssuer,
    revocation: RevocationRegistry,
    audit: AuditLogger,
    policy: CredentialPolicy,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: SessionIssuer,
        policy: CredentialPolicy,
    ) -> Self {
        let audit = AuditLogger::new();
        Self {
            revocation: RevocationRegistry::new(store.clone(), audit),
            store,
            issuer,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    pub fn revocation(&self) -> &RevocationRegistry {
        &self.revocation
    }

    /// Register a client under `name`, storing only the secret's hash.
    ///
    /// # Errors
    /// - [`CredentialError::ClientExists`] when the name or secret is taken.
    pub async fn register_client(
        &self,
        name: &str,
        raw_secret: &str,
        roles: Vec<String>,
    ) -> Result<Client, CredentialError> {
        let client = Client {
            name: name.to_string(),
            secret_hash: hash_client_secret(raw_secret),
            roles,
            created_at: Utc::now(),
        };
        match self.store.create_client(self.policy.deadline(), client).await {
            Ok(client) => {
                tracing::info!(client = %client.name, "client registered");
                Ok(client)
            }
            Err(StoreError::Conflict(_)) => Err(CredentialError::ClientExists),
            Err(err) => Err(err.into()),
        }
    }

    /// Authenticate a client by raw secret and issue a session credential plus
    /// a new refresh credential, retiring the client's previous one.
    ///
    /// # Errors
    /// - [`CredentialError::RevokedClient`] when the secret is revoked, even if
    ///   the client row still exists.
    /// - [`CredentialError::InvalidClient`] when no client matches.
    /// - [`CredentialError::Timeout`] / [`CredentialError::Storage`] when the
    ///   store fails; nothing is persisted in that case.
    pub async fn issue_token(
        &self,
        raw_secret: &str,
        origin: &Origin,
    ) -> Result<IssuedCredentials, CredentialError> {
        let deadline = self.policy.deadline();
        let secret_hash = hash_client_secret(raw_secret);

        if self
            .revocation
            .is_client_revoked(deadline, &secret_hash)
            .await?
        {
            return Err(CredentialError::RevokedClient);
        }
        let client = match self
            .store
            .find_client_by_secret_hash(deadline, &secret_hash)
            .await
        {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => return Err(CredentialError::InvalidClient),
            Err(err) => return Err(err.into()),
        };

        let session_token =
            self.issuer
                .issue_session(&client.name, &client.roles, self.policy.session_ttl)?;
        let now = Utc::now();
        let replacement = RefreshCredential {
            token: generate_refresh_token(),
            client_secret_hash: secret_hash.clone(),
            expires_at: self.policy.refresh_expiry(now),
            created_at: now,
        };
        let events = vec![
            self.audit
                .refresh_issued(&secret_hash, &replacement.token, origin, now),
            self.audit
                .session_issued(&secret_hash, &session_token, origin, now),
        ];
        let rotation = Rotation {
            replacement: replacement.clone(),
            origin: origin.clone(),
            now,
            events: events.clone(),
        };
        let retired = match self.store.rotate_refresh_token(deadline, rotation).await {
            Ok(retired) => retired,
            // The client row vanished between lookup and lock.
            Err(StoreError::NotFound(_)) => return Err(CredentialError::InvalidClient),
            // Revoked after the check above but before the rotation committed.
            Err(StoreError::Revoked(_)) => return Err(CredentialError::RevokedClient),
            Err(err) => return Err(err.into()),
        };

        if let Some(retired) = &retired {
            self.audit.emit(&[self.audit.refresh_revoked(
                &secret_hash,
                &retired.token,
                origin,
                REASON_ROTATION,
                now,
            )]);
        }
        self.audit.emit(&events);

        Ok(IssuedCredentials {
            session_token,
            refresh_token: replacement.token,
            session_expires_in: self.policy.session_ttl.as_secs(),
            refresh_expires_at: replacement.expires_at,
        })
    }

    /// Exchange a live refresh credential for a new session credential. The
    /// refresh credential itself is not rotated.
    ///
    /// # Errors
    /// - [`CredentialError::RevokedToken`] for a retired or revoked token.
    /// - [`CredentialError::InvalidToken`] for an unknown token.
    /// - [`CredentialError::Expired`] once `expires_at` has passed.
    /// - [`CredentialError::ClientNotFound`] when the owning client is gone.
    /// - [`CredentialError::RevokedClient`] when the owning secret is revoked.
    pub async fn refresh_token(
        &self,
        token: &str,
        origin: &Origin,
    ) -> Result<RefreshedSession, CredentialError> {
        let deadline = self.policy.deadline();

        if self
            .revocation
            .is_refresh_token_revoked(deadline, token)
            .await?
        {
            return Err(CredentialError::RevokedToken);
        }
        let credential = match self.store.find_refresh_token(deadline, token).await {
            Ok(credential) => credential,
            Err(StoreError::NotFound(_)) => return Err(CredentialError::InvalidToken),
            Err(err) => return Err(err.into()),
        };
        let now = Utc::now();
        if credential.is_expired_at(now) {
            return Err(CredentialError::Expired);
        }
        let client = match self
            .store
            .find_client_by_secret_hash(deadline, &credential.client_secret_hash)
            .await
        {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => return Err(CredentialError::ClientNotFound),
            Err(err) => return Err(err.into()),
        };
        // Covers a token issued concurrently with its client's revocation.
        if self
            .revocation
            .is_client_revoked(deadline, &client.secret_hash)
            .await?
        {
            return Err(CredentialError::RevokedClient);
        }

        let session_token =
            self.issuer
                .issue_session(&client.name, &client.roles, self.policy.session_ttl)?;
        let events = vec![
            self.audit
                .refresh_used(&client.secret_hash, token, origin, now),
            self.audit
                .session_issued(&client.secret_hash, &session_token, origin, now),
        ];
        self.audit
            .record(self.store.as_ref(), deadline, events)
            .await?;

        Ok(RefreshedSession {
            session_token,
            expires_in: self.policy.session_ttl.as_secs(),
        })
    }
}

//! Credential store abstraction.
//!
//! # Purpose
//! Defines the [`CredentialStore`] trait that owns client rows, refresh
//! credentials, the two revocation sets, and the audit log, plus the error and
//! deadline types shared by the in-memory and Postgres backends.
//!
//! # Key invariants
//! - Lookups fail with [`StoreError::NotFound`] rather than returning an empty
//!   value, so callers can tell "missing" from "present but invalid".
//! - [`CredentialStore::rotate_refresh_token`] is one atomic unit: retiring
//!   the active credential, inserting the replacement, and appending every
//!   audit event either all commit or none do.
//! - Revocation marks and audit events are append-only.
//!
//! # Cancellation
//! Every operation takes a [`Deadline`]. When it passes, the in-flight future
//! is dropped (rolling back any open transaction) and the call returns
//! [`StoreError::Timeout`]. Dropping the caller's future has the same effect.
use crate::model::{AuditEvent, Client, Origin, RefreshCredential};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("revoked: {0}")]
    Revoked(String),
    #[error("store deadline exceeded")]
    Timeout,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Unexpected(value.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(value.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Absolute point in time by which a store operation must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(tokio::time::Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(tokio::time::Instant::now() + timeout)
    }

    pub fn at(instant: tokio::time::Instant) -> Self {
        Self(instant)
    }

    pub fn is_expired(&self) -> bool {
        tokio::time::Instant::now() >= self.0
    }

    /// Drive `operation` to completion or fail with [`StoreError::Timeout`].
    pub async fn run<T, F>(self, operation: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout_at(self.0, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

/// Everything needed to retire a client's active refresh credential and
/// install its replacement in one transaction.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub replacement: RefreshCredential,
    pub origin: Origin,
    pub now: DateTime<Utc>,
    /// Events appended after the retirement record, e.g. refresh and session
    /// issuance.
    pub events: Vec<AuditEvent>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_client(&self, deadline: Deadline, client: Client) -> StoreResult<Client>;
    async fn find_client_by_secret_hash(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> StoreResult<Client>;
    async fn find_client_by_name(&self, deadline: Deadline, name: &str) -> StoreResult<Client>;

    async fn is_client_secret_revoked(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> StoreResult<bool>;
    async fn is_refresh_token_revoked(&self, deadline: Deadline, token: &str)
    -> StoreResult<bool>;

    async fn find_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
    ) -> StoreResult<RefreshCredential>;
    async fn active_refresh_token(
        &self,
        deadline: Deadline,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshCredential>;

    /// Retire the client's active refresh credential (if any) and insert
    /// `rotation.replacement`. Returns the retired credential.
    ///
    /// Fails with [`StoreError::Revoked`] when the owning client secret is
    /// marked revoked at the point the rotation would commit.
    async fn rotate_refresh_token(
        &self,
        deadline: Deadline,
        rotation: Rotation,
    ) -> StoreResult<Option<RefreshCredential>>;

    /// Delete the credential row (if present), mark the token revoked, and
    /// append `event`. Revoking an already-marked token is a no-op.
    async fn revoke_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
        event: AuditEvent,
    ) -> StoreResult<()>;

    /// Mark a client secret revoked and retire every refresh credential the
    /// client holds. Returns the retired tokens.
    async fn revoke_client_secret(
        &self,
        deadline: Deadline,
        secret_hash: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<String>>;

    async fn append_audit_events(
        &self,
        deadline: Deadline,
        events: Vec<AuditEvent>,
    ) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_passes_through_results() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let value = deadline.run(async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(value.expect("value"), 7);
    }

    #[tokio::test]
    async fn deadline_times_out_slow_operations() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn expired_deadline_is_reported() {
        let deadline = Deadline::after(Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(deadline.is_expired());
    }
}

//! Permanent revocation of client secrets and refresh credentials.
//!
//! Marks are insert-only. There is no way to lift one, and checking a mark is
//! a single keyed lookup in the store.
use crate::auth::audit::AuditLogger;
use crate::auth::rotation::CredentialError;
use crate::auth::secrets::hash_client_secret;
use crate::model::{Origin, REASON_CLIENT_REVOKED, REASON_OPERATOR};
use crate::store::{CredentialStore, Deadline, StoreError};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct RevocationRegistry {
    store: Arc<dyn CredentialStore>,
    audit: AuditLogger,
}

impl RevocationRegistry {
    pub fn new(store: Arc<dyn CredentialStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    pub async fn is_client_revoked(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> Result<bool, CredentialError> {
        Ok(self
            .store
            .is_client_secret_revoked(deadline, secret_hash)
            .await?)
    }

    /// Convenience for callers holding the raw secret.
    pub async fn is_secret_revoked(
        &self,
        deadline: Deadline,
        raw_secret: &str,
    ) -> Result<bool, CredentialError> {
        self.is_client_revoked(deadline, &hash_client_secret(raw_secret))
            .await
    }

    pub async fn is_refresh_token_revoked(
        &self,
        deadline: Deadline,
        token: &str,
    ) -> Result<bool, CredentialError> {
        Ok(self.store.is_refresh_token_revoked(deadline, token).await?)
    }

    /// Revoke one refresh credential. Revoking a token twice is a no-op.
    ///
    /// Unknown tokens are still marked, so a value that was never issued can
    /// never become usable later.
    pub async fn revoke_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
        origin: &Origin,
    ) -> Result<(), CredentialError> {
        if self.store.is_refresh_token_revoked(deadline, token).await? {
            return Ok(());
        }
        let owner = match self.store.find_refresh_token(deadline, token).await {
            Ok(credential) => credential.client_secret_hash,
            Err(StoreError::NotFound(_)) => String::new(),
            Err(err) => return Err(err.into()),
        };
        let event = self
            .audit
            .refresh_revoked(&owner, token, origin, REASON_OPERATOR, Utc::now());
        self.store
            .revoke_refresh_token(deadline, token, event.clone())
            .await?;
        self.audit.emit(&[event]);
        Ok(())
    }

    /// Revoke a client's secret and every refresh credential it holds.
    ///
    /// # Errors
    /// - [`CredentialError::ClientNotFound`] when no client has `name`.
    pub async fn revoke_client(
        &self,
        deadline: Deadline,
        name: &str,
        origin: &Origin,
    ) -> Result<Vec<String>, CredentialError> {
        let client = match self.store.find_client_by_name(deadline, name).await {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => return Err(CredentialError::ClientNotFound),
            Err(err) => return Err(err.into()),
        };
        let now = Utc::now();
        let retired = self
            .store
            .revoke_client_secret(deadline, &client.secret_hash, origin, now)
            .await?;
        let events: Vec<_> = retired
            .iter()
            .map(|token| {
                self.audit.refresh_revoked(
                    &client.secret_hash,
                    token,
                    origin,
                    REASON_CLIENT_REVOKED,
                    now,
                )
            })
            .collect();
        self.audit.emit(&events);
        tracing::info!(
            client = %client.name,
            retired = retired.len(),
            "client secret revoked"
        );
        Ok(retired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditAction, Client, RefreshCredential};
    use crate::store::memory::InMemoryStore;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    async fn seeded() -> (InMemoryStore, RevocationRegistry) {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .create_client(
                deadline(),
                Client {
                    name: "alpha".to_string(),
                    secret_hash: hash_client_secret("s3cr3t"),
                    roles: vec!["ingest".to_string()],
                    created_at: now,
                },
            )
            .await
            .expect("client");
        store
            .insert_refresh_token(RefreshCredential {
                token: "r1".to_string(),
                client_secret_hash: hash_client_secret("s3cr3t"),
                expires_at: now + ChronoDuration::days(90),
                created_at: now,
            })
            .await;
        let registry = RevocationRegistry::new(Arc::new(store.clone()), AuditLogger::new());
        (store, registry)
    }

    #[tokio::test]
    async fn revoke_client_marks_secret_and_tokens() {
        let (store, registry) = seeded().await;
        let retired = registry
            .revoke_client(deadline(), "alpha", &Origin::default())
            .await
            .expect("revoke");
        assert_eq!(retired, vec!["r1".to_string()]);
        assert!(registry.is_secret_revoked(deadline(), "s3cr3t").await.expect("check"));
        assert!(
            registry
                .is_refresh_token_revoked(deadline(), "r1")
                .await
                .expect("check")
        );
        let reasons: Vec<_> = store
            .audit_events()
            .await
            .into_iter()
            .filter(|event| event.action == AuditAction::Revoked)
            .filter_map(|event| event.reason().map(str::to_string))
            .collect();
        assert_eq!(reasons, vec![REASON_CLIENT_REVOKED.to_string()]);
    }

    #[tokio::test]
    async fn revoke_unknown_client_is_not_found() {
        let (_store, registry) = seeded().await;
        let result = registry
            .revoke_client(deadline(), "nobody", &Origin::default())
            .await;
        assert!(matches!(result, Err(CredentialError::ClientNotFound)));
    }

    #[tokio::test]
    async fn revoke_refresh_token_twice_records_once() {
        let (store, registry) = seeded().await;
        for _ in 0..2 {
            registry
                .revoke_refresh_token(deadline(), "r1", &Origin::default())
                .await
                .expect("revoke");
        }
        let events = store.audit_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason(), Some(REASON_OPERATOR));
        assert_eq!(events[0].client_secret_hash, hash_client_secret("s3cr3t"));
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_still_marked() {
        let (_store, registry) = seeded().await;
        registry
            .revoke_refresh_token(deadline(), "never-issued", &Origin::default())
            .await
            .expect("revoke");
        assert!(
            registry
                .is_refresh_token_revoked(deadline(), "never-issued")
                .await
                .expect("check")
        );
    }
}

//! Audit trail for credential transitions.
//!
//! Events are built here, persisted through the store as part of the
//! operation that caused them, and only announced (log line plus counter)
//! once that operation has committed.
use crate::auth::secrets::session_token_ref;
use crate::model::{AuditAction, AuditEvent, CredentialKind, Origin};
use crate::observability::CREDENTIAL_EVENTS_TOTAL;
use crate::store::{CredentialStore, Deadline, StoreResult};
use chrono::{DateTime, Utc};

pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn session_issued(
        &self,
        client_secret_hash: &str,
        session_token: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> AuditEvent {
        AuditEvent::new(
            client_secret_hash,
            CredentialKind::Session,
            AuditAction::Issued,
            &session_token_ref(session_token),
            origin,
            now,
        )
    }

    pub fn refresh_issued(
        &self,
        client_secret_hash: &str,
        refresh_token: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> AuditEvent {
        AuditEvent::new(
            client_secret_hash,
            CredentialKind::Refresh,
            AuditAction::Issued,
            refresh_token,
            origin,
            now,
        )
    }

    pub fn refresh_used(
        &self,
        client_secret_hash: &str,
        refresh_token: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> AuditEvent {
        AuditEvent::new(
            client_secret_hash,
            CredentialKind::Refresh,
            AuditAction::Used,
            refresh_token,
            origin,
            now,
        )
    }

    pub fn refresh_revoked(
        &self,
        client_secret_hash: &str,
        refresh_token: &str,
        origin: &Origin,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AuditEvent {
        AuditEvent::refresh_revoked(client_secret_hash, refresh_token, origin, reason, now)
    }

    /// Append `events` as one unit, then announce them.
    ///
    /// A failed append is returned to the caller and nothing is announced.
    pub async fn record(
        &self,
        store: &dyn CredentialStore,
        deadline: Deadline,
        events: Vec<AuditEvent>,
    ) -> StoreResult<()> {
        store.append_audit_events(deadline, events.clone()).await?;
        self.emit(&events);
        Ok(())
    }

    /// Announce events that have already been committed.
    pub fn emit(&self, events: &[AuditEvent]) {
        for event in events {
            tracing::info!(
                target: AUDIT_TARGET,
                kind = event.kind.as_str(),
                action = event.action.as_str(),
                client = %short_ref(&event.client_secret_hash),
                token_ref = %short_ref(&event.token_ref),
                ip = %event.ip,
                user_agent = %event.user_agent,
                reason = event.reason().unwrap_or(""),
                "credential event"
            );
            metrics::counter!(
                CREDENTIAL_EVENTS_TOTAL,
                "kind" => event.kind.as_str(),
                "action" => event.action.as_str()
            )
            .increment(1);
        }
    }
}

// Log lines carry a prefix only; full refresh tokens stay in the store.
fn short_ref(value: &str) -> &str {
    let end = value
        .char_indices()
        .nth(12)
        .map(|(index, _)| index)
        .unwrap_or(value.len());
    &value[..end]
}

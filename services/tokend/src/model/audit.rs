//! Audit event records for the credential lifecycle.
//!
//! # Purpose
//! Every issue / use / revoke transition is captured as an immutable
//! [`AuditEvent`] row. The core only ever appends these; reporting reads them
//! back out of band.
//!
//! # Notes
//! `token_ref` holds the refresh token value for refresh events and the hex
//! SHA-256 of the signed token for session events, so a session token is never
//! persisted verbatim.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

/// `metadata.reason` for a refresh credential retired by a newer issuance.
pub const REASON_ROTATION: &str = "rotation";
/// `metadata.reason` for an operator revoking a single refresh credential.
pub const REASON_OPERATOR: &str = "operator";
/// `metadata.reason` for refresh credentials retired with their client.
pub const REASON_CLIENT_REVOKED: &str = "client_revoked";

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Session,
    Refresh,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Session => "session",
            CredentialKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Issued,
    Used,
    Revoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Issued => "issued",
            AuditAction::Used => "used",
            AuditAction::Revoked => "revoked",
        }
    }
}

/// Network origin of the request that caused a transition.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub ip: String,
    pub user_agent: String,
}

impl Origin {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEvent {
    pub client_secret_hash: String,
    pub kind: CredentialKind,
    pub action: AuditAction,
    pub token_ref: String,
    pub ip: String,
    pub user_agent: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        client_secret_hash: &str,
        kind: CredentialKind,
        action: AuditAction,
        token_ref: &str,
        origin: &Origin,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            client_secret_hash: client_secret_hash.to_string(),
            kind,
            action,
            token_ref: token_ref.to_string(),
            ip: origin.ip.clone(),
            user_agent: origin.user_agent.clone(),
            metadata: json!({}),
            created_at,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        if let Value::Object(map) = &mut self.metadata {
            map.insert("reason".to_string(), Value::String(reason.to_string()));
        }
        self
    }

    /// Retirement of a refresh credential, recorded by the store inside the
    /// same transaction that deletes the row.
    pub fn refresh_revoked(
        client_secret_hash: &str,
        token: &str,
        origin: &Origin,
        reason: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            client_secret_hash,
            CredentialKind::Refresh,
            AuditAction::Revoked,
            token,
            origin,
            created_at,
        )
        .with_reason(reason)
    }

    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_revoked_carries_reason() {
        let origin = Origin::new("10.0.0.1", "curl/8");
        let event =
            AuditEvent::refresh_revoked("hash", "tok", &origin, REASON_ROTATION, Utc::now());
        assert_eq!(event.kind, CredentialKind::Refresh);
        assert_eq!(event.action, AuditAction::Revoked);
        assert_eq!(event.reason(), Some(REASON_ROTATION));
        assert_eq!(event.ip, "10.0.0.1");
        assert_eq!(event.user_agent, "curl/8");
    }

    #[test]
    fn kinds_and_actions_map_to_column_values() {
        assert_eq!(CredentialKind::Session.as_str(), "session");
        assert_eq!(CredentialKind::Refresh.as_str(), "refresh");
        assert_eq!(AuditAction::Issued.as_str(), "issued");
        assert_eq!(AuditAction::Used.as_str(), "used");
        assert_eq!(AuditAction::Revoked.as_str(), "revoked");
    }
}

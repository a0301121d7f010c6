//! Credential data model module.
//!
//! # Purpose
//! Re-exports the client, refresh credential, and audit event records shared
//! by the store, the rotation protocol, and the HTTP API.
mod audit;
mod client;
mod refresh;

pub use audit::{
    AuditAction, AuditEvent, CredentialKind, Origin, REASON_CLIENT_REVOKED, REASON_OPERATOR,
    REASON_ROTATION,
};
pub use client::Client;
pub use refresh::RefreshCredential;

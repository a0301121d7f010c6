//! Registered client records.
//!
//! # Purpose
//! Defines the identity row a long-lived client secret resolves to. The raw
//! secret is never stored; only its one-way hash is.
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub name: String,
    /// Hex SHA-256 of the client's long-lived secret.
    pub secret_hash: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

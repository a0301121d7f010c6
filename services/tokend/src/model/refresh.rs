//! Refresh credential rows.
//!
//! # Purpose
//! A refresh credential is an opaque random token bound to one client (by
//! secret hash) with an absolute expiry. A row exists only while the
//! credential is live; rotation and revocation delete it.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshCredential {
    pub token: String,
    pub client_secret_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshCredential {
    /// Expiry is inclusive: a credential whose `expires_at` equals `now` is
    /// already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now)
    }
}

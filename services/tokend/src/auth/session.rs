//! Signed session credential minting and validation.
//!
//! # Purpose
//! Session credentials are stateless HS256 JWTs carrying the client name and
//! its roles. They have no row in the store; validity is decided purely by
//! signature, issuer, audience, and the `iat`..`exp` window.
//!
//! # Key invariants
//! - The algorithm is fixed to HS256. Tokens declaring any other algorithm
//!   are rejected.
//! - `iss` and `aud` must match the configured values exactly.
//! - Expiry is checked with zero leeway.
//! - The signing secret is immutable for the life of the process and is never
//!   logged.
//!
//! # How to use
//! Build one [`SessionIssuer`] from [`SigningConfig`] at startup and share it.
//! Call [`SessionIssuer::issue_session`] after a client has been
//! authenticated, and [`SessionIssuer::validate_session`] from the bearer gate.
use crate::config::SigningConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by a session credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// Random nonce so two sessions minted in the same second still differ.
    pub jti: String,
}

/// Identity recovered from a valid session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub subject: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session token signature is invalid")]
    InvalidSignature,
    #[error("session token has expired")]
    Expired,
    #[error("session token is malformed")]
    MalformedToken,
    #[error("failed to sign session token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl SessionError {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SessionError::InvalidSignature => "invalid_signature",
            SessionError::Expired => "expired",
            SessionError::MalformedToken => "malformed",
            SessionError::Signing(_) => "signing",
        }
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> SessionError {
    match err.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => SessionError::Expired,
        // A token minted for another issuer or audience was not signed for us.
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidAlgorithm => SessionError::InvalidSignature,
        _ => SessionError::MalformedToken,
    }
}

#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
}

impl fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&config.secret),
            decoding_key: DecodingKey::from_secret(&config.secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Mint a session credential valid from now for `ttl`.
    ///
    /// # Errors
    /// - [`SessionError::Signing`] only if the HMAC primitive itself fails.
    pub fn issue_session(
        &self,
        client_name: &str,
        roles: &[String],
        ttl: Duration,
    ) -> Result<String, SessionError> {
        let now = now_epoch_seconds();
        let claims = SessionClaims {
            sub: client_name.to_string(),
            roles: roles.to_vec(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: nonce(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        jsonwebtoken::encode(&Header::new(SESSION_ALGORITHM), claims, &self.encoding_key)
            .map_err(SessionError::Signing)
    }

    /// Verify signature, algorithm, issuer, audience, and expiry.
    ///
    /// # Errors
    /// - [`SessionError::InvalidSignature`] for a bad signature or a token
    ///   minted for another issuer/audience.
    /// - [`SessionError::Expired`] once `exp` has passed.
    /// - [`SessionError::MalformedToken`] for anything that does not parse.
    pub fn validate_session(&self, token: &str) -> Result<SessionIdentity, SessionError> {
        let mut validation = Validation::new(SESSION_ALGORITHM);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(classify)?;
        Ok(SessionIdentity {
            subject: data.claims.sub,
            roles: data.claims.roles,
        })
    }
}

fn nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn now_epoch_seconds() -> i64 {
    // Clamp to zero if the clock reads before the epoch.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

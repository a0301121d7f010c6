//! Credential issuance, validation, and enforcement.
//!
//! # Purpose
//! Groups session signing, refresh rotation, revocation, audit emission, and
//! the axum authorization gate.
pub mod audit;
pub mod gate;
pub mod revocation;
pub mod rotation;
pub mod secrets;
pub mod session;

pub use gate::AuthContext;
pub use rotation::{CredentialError, CredentialPolicy, CredentialService};
pub use session::{SessionError, SessionIdentity, SessionIssuer};

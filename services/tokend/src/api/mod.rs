//! tokend HTTP API module.
//!
//! # Purpose
//! Route handlers grouped by the gate that protects them: public token
//! endpoints, bearer-protected session endpoints, and operator endpoints.
pub mod admin;
pub mod error;
pub mod openapi;
pub mod session;
pub mod system;
pub mod tokens;
pub mod types;

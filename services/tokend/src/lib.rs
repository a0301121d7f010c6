//! tokend service library crate.
//!
//! # Purpose
//! Exposes credential issuance, rotation, and revocation, the HTTP API around
//! them, configuration, and the storage backends for the binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;

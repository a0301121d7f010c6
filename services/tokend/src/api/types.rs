//! HTTP API request/response types.
//!
//! # Purpose
//! Defines payload shapes for the token, session, and operator endpoints and
//! their OpenAPI schemas.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Clone)]
pub struct TokenRequest {
    pub client_secret: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct TokenResponse {
    pub session_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Session lifetime in seconds.
    pub expires_in: u64,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema, Clone)]
pub struct RefreshRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RefreshResponse {
    pub session_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub subject: String,
    pub roles: Vec<String>,
}

#[derive(Deserialize, ToSchema, Clone)]
pub struct ClientCreateRequest {
    pub name: String,
    pub client_secret: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct ClientResponse {
    pub name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ClientRevocationRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema, Clone)]
pub struct RefreshTokenRevocationRequest {
    pub refresh_token: String,
}

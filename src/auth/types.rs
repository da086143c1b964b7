// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store key for the access token
pub const ACCESS_TOKEN_KEY: &str = "token";

/// Store key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Store key for the logged-in user profile
pub const USER_KEY: &str = "user";

/// Access/refresh token pair
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Logged-in user, as kept in the session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default = "Utc::now")]
    pub logged_in_at: DateTime<Utc>,
}

/// Refresh endpoint request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh endpoint response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: String,
    /// Present when the backend rotates refresh tokens
    pub refresh_token: Option<String>,
}

/// Token data after a successful refresh
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Login endpoint request
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Profile as returned by the login endpoint
#[derive(Debug, Deserialize)]
pub struct LoginUser {
    pub id: i64,
    pub email: String,
    pub nickname: Option<String>,
}

/// Login endpoint response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: LoginUser,
}

/// Coarse session state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Access token present, requests pass through
    Active,
    /// One request is refreshing the token, others may be queued
    Refreshing,
    /// No credentials; only a fresh login recovers
    Expired,
}

//! Response bodies for the HTTP endpoints.

use serde::{Deserialize, Serialize};

/// Successful refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub invalidated: bool,
}

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    /// Whether the key-value store answered a probe
    pub store: bool,
    /// Whether at least one signing secret is configured
    pub secrets_configured: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

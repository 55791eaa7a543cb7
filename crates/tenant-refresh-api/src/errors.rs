//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tenant_refresh_core::RefreshError;
use tracing::{error, warn};

/// Seconds a caller is asked to wait after a transient store failure
const STORE_RETRY_AFTER_SECONDS: u64 = 5;

/// Refresh handler errors with HTTP status code mapping
///
/// - `401 Unauthorized`: any authentication failure, intentionally
///   undifferentiated
/// - `409 Conflict`: the webhook id was already processed; do not retry
/// - `413 Payload Too Large`: declared or actual body over the bound
/// - `422 Unprocessable Entity`: authenticated but semantically invalid body
/// - `429 Too Many Requests`: caller quota exhausted, with `Retry-After`
/// - `500 Internal Server Error`: no signing secrets configured
/// - `503 Service Unavailable`: the shared store failed, with `Retry-After`
///
/// # Security Considerations
///
/// Store and configuration details are logged server-side only; clients get
/// a fixed message.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Pipeline stopped the request
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

impl WebhookHandlerError {
    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        let Self::Refresh(e) = self;
        match e {
            RefreshError::Misconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            RefreshError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RefreshError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RefreshError::Unauthorized => StatusCode::UNAUTHORIZED,
            RefreshError::UnprocessablePayload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RefreshError::Conflict { .. } => StatusCode::CONFLICT,
            RefreshError::Store(store_error) if store_error.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RefreshError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, retry_after) = match &self {
            Self::Refresh(RefreshError::Misconfigured) => {
                error!("Refresh webhook rejected: signing secrets are not configured");
                ("Webhook endpoint is not configured".to_string(), None)
            }
            Self::Refresh(RefreshError::RateLimited {
                retry_after_seconds,
                ..
            }) => {
                warn!(retry_after = retry_after_seconds, "Rate limit exceeded");
                (self.to_string(), Some(*retry_after_seconds))
            }
            Self::Refresh(RefreshError::Store(e)) => {
                error!(error = %e, "Store failure while processing refresh webhook");
                let retry_after = e.is_transient().then_some(STORE_RETRY_AFTER_SECONDS);
                (
                    "Service temporarily unavailable. Please try again later.".to_string(),
                    retry_after,
                )
            }
            Self::Refresh(_) => (self.to_string(), None),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] ::config::ConfigError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

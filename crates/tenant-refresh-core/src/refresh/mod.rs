//! # Config Refresh Pipeline
//!
//! Types shared by the refresh pipeline: the inbound request, tunable
//! settings, the successful outcome, and the error taxonomy.
//!
//! The pipeline itself is [`ConfigInvalidationCoordinator`].

use crate::signature::SigningSecrets;
use crate::store::{keys, StoreError};
use crate::{ErrorCategory, Hostname, TenantId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub mod coordinator;

pub use coordinator::ConfigInvalidationCoordinator;

/// Upper bound for declared and actual body size
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Rate-limit bucket used for refresh webhooks
pub const DEFAULT_RATE_LIMIT_BUCKET: &str = "config-refresh";

// ============================================================================
// Request
// ============================================================================

/// One inbound refresh call, as seen by the pipeline
///
/// Everything the HTTP layer could not find is `None`; deciding whether that
/// is acceptable is the pipeline's job.
#[derive(Clone)]
pub struct WebhookRequest {
    /// Caller network identity (usually the client IP)
    pub client_ip: String,
    /// Currently valid signing secrets, newest first
    pub secrets: SigningSecrets,
    /// Raw request body
    pub raw_body: Option<Bytes>,
    /// Value of the signature header
    pub signature: Option<String>,
    /// Caller-supplied idempotency id
    pub webhook_id: Option<String>,
    /// Length the caller declared before sending the body
    pub declared_length: u64,
}

impl WebhookRequest {
    /// Create a request carrying only the caller identity and secrets
    pub fn new(client_ip: impl Into<String>, secrets: SigningSecrets) -> Self {
        Self {
            client_ip: client_ip.into(),
            secrets,
            raw_body: None,
            signature: None,
            webhook_id: None,
            declared_length: 0,
        }
    }

    /// Attach the raw body; an empty body counts as absent
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.raw_body = if body.is_empty() { None } else { Some(body) };
        self
    }

    /// Attach the signature header value
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attach the webhook id
    pub fn with_webhook_id(mut self, webhook_id: impl Into<String>) -> Self {
        self.webhook_id = Some(webhook_id.into());
        self
    }

    /// Set the declared content length
    pub fn with_declared_length(mut self, declared_length: u64) -> Self {
        self.declared_length = declared_length;
        self
    }

    /// Actual body length in bytes
    pub fn body_len(&self) -> usize {
        self.raw_body.as_ref().map_or(0, Bytes::len)
    }
}

impl fmt::Debug for WebhookRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookRequest")
            .field("client_ip", &self.client_ip)
            .field("secrets", &self.secrets)
            .field("body_len", &self.body_len())
            .field("has_signature", &self.signature.is_some())
            .field("webhook_id", &self.webhook_id)
            .field("declared_length", &self.declared_length)
            .finish()
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Tunables of the refresh pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Rate-limit bucket for refresh calls
    pub rate_limit_bucket: String,
    /// Maximum declared and actual body size
    pub max_payload_bytes: usize,
    /// Replay window for signature timestamps
    pub max_age_seconds: i64,
    /// Namespace of the response cache
    pub response_cache_prefix: String,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            rate_limit_bucket: DEFAULT_RATE_LIMIT_BUCKET.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_age_seconds: crate::SignatureVerifier::DEFAULT_MAX_AGE_SECONDS,
            response_cache_prefix: keys::DEFAULT_RESPONSE_CACHE_PREFIX.to_string(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of a successful refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationOutcome {
    /// Hostname named in the payload
    pub hostname: Hostname,
    /// Tenant whose cache entries were dropped
    pub tenant_id: TenantId,
    /// Whether the tenant id came from the cache or fell back to the hostname
    pub resolved_from_cache: bool,
    /// Key-value store keys removal was issued for, in order
    pub removed_keys: Vec<String>,
    /// Response cache key removal was issued for
    pub response_cache_key: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Every way the pipeline can stop
///
/// Authentication failures are deliberately a single variant so responses
/// do not tell a prober which check failed.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Webhook signing secrets are not configured")]
    Misconfigured,

    #[error("Rate limit exceeded. Retry after {retry_after_seconds}s")]
    RateLimited {
        retry_after_seconds: u64,
        reset_at: DateTime<Utc>,
    },

    #[error("Payload too large: {size} bytes (max: {max_size} bytes)")]
    PayloadTooLarge { size: u64, max_size: usize },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unprocessable payload: {message}")]
    UnprocessablePayload { message: String },

    #[error("Webhook '{webhook_id}' has already been processed")]
    Conflict { webhook_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl RefreshError {
    /// Stable short name, suitable for metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Misconfigured => "misconfigured",
            Self::RateLimited { .. } => "rate_limited",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Unauthorized => "unauthorized",
            Self::UnprocessablePayload { .. } => "unprocessable_payload",
            Self::Conflict { .. } => "conflict",
            Self::Store(_) => "store_error",
        }
    }

    /// Check if the caller may retry the same request later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Store(e) => e.is_transient(),
            Self::Misconfigured
            | Self::PayloadTooLarge { .. }
            | Self::Unauthorized
            | Self::UnprocessablePayload { .. }
            | Self::Conflict { .. } => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Misconfigured => ErrorCategory::Configuration,
            Self::RateLimited { .. } | Self::Unauthorized => ErrorCategory::Security,
            Self::PayloadTooLarge { .. }
            | Self::UnprocessablePayload { .. }
            | Self::Conflict { .. } => ErrorCategory::Permanent,
            Self::Store(_) => ErrorCategory::Transient,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

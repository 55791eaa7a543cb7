//! # Tenant-Refresh Core
//!
//! Core logic for the storefront's inbound configuration-refresh webhook.
//!
//! A refresh webhook tells the storefront that a tenant's configuration has
//! changed upstream. Before anything is touched the caller is rate limited,
//! the payload is size-bounded, and the HMAC signature and timestamp are
//! verified against the configured signing secrets. Authenticated requests
//! are then de-duplicated by webhook id and the tenant's cached identity,
//! configuration and rendered response entries are invalidated together.
//!
//! ## Architecture
//!
//! - Business logic depends only on the [`KeyValueStore`] and [`ResponseCache`]
//!   traits; adapters live in [`adapters`]
//! - Time is read through the [`Clock`] trait so windows can be tested
//! - The pipeline itself is [`ConfigInvalidationCoordinator`]
//!
//! ## Usage
//!
//! ```rust
//! use tenant_refresh_core::{SignatureVerifier, SigningSecrets};
//!
//! let payload = SignatureVerifier::signed_payload(1_700_000_000, br#"{"hostname":"a.com"}"#);
//! let signature = SignatureVerifier::compute_signature(&payload, "secret").unwrap();
//! let secrets = SigningSecrets::from_comma_separated("secret");
//!
//! assert!(SignatureVerifier::verify(&payload, &signature, &secrets));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier of a storefront tenant
///
/// Usually an opaque id issued by the commerce backend. When a hostname has
/// never been resolved the hostname itself stands in as the tenant id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create new tenant ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "tenant_id".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Use a hostname as the tenant identifier
    pub fn from_hostname(hostname: &Hostname) -> Self {
        Self(hostname.as_str().to_string())
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Hostname a tenant is reachable under (primary domain or alias)
///
/// Hostnames are stored verbatim; the only requirement is that they are
/// non-empty and free of whitespace, since they become part of store keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Create new hostname with validation
    ///
    /// # Validation Rules
    /// - Must not be empty
    /// - Must be at most 253 characters
    /// - Must not contain whitespace or control characters
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "hostname".to_string(),
            });
        }

        if value.len() > 253 {
            return Err(ValidationError::TooLong {
                field: "hostname".to_string(),
                max_length: 253,
            });
        }

        if value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ValidationError::InvalidCharacters {
                field: "hostname".to_string(),
                invalid_chars: "whitespace or control characters".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Hostname {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Caller-supplied webhook identifier used purely for idempotency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookId(String);

impl WebhookId {
    /// Create new webhook ID
    ///
    /// The value is opaque; only blankness and length are checked.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "webhook_id".to_string(),
            });
        }

        if value.len() > 256 {
            return Err(ValidationError::TooLong {
                field: "webhook_id".to_string(),
                max_length: 256,
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that should be retried
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Security-related failures requiring attention
    Security,
    /// Configuration errors on the server side
    Configuration,
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Injectable time source
pub mod clock;

/// HMAC signature header parsing and verification
pub mod signature;

/// Key-value store and response cache abstractions
pub mod store;

/// Sliding-window rate limiting over the shared store
pub mod rate_limit;

/// Idempotency markers for processed webhooks
pub mod replay_guard;

/// Tenant identity and configuration caching
pub mod tenant;

/// The config-refresh pipeline
pub mod refresh;

/// Storage adapters for infrastructure implementations
pub mod adapters;

// Re-export key types for convenience
pub use adapters::{FilesystemKeyValueStore, InMemoryKeyValueStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use refresh::{
    ConfigInvalidationCoordinator, InvalidationOutcome, RefreshError, RefreshSettings,
    WebhookRequest,
};
pub use replay_guard::ReplayGuard;
pub use signature::{SignatureError, SignatureVerifier, SignedEnvelope, SigningSecrets};
pub use store::{KeyValueStore, ResponseCache, StoreError};
pub use tenant::{TenantCache, TenantConfig};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

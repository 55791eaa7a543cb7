//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tenant_refresh_core::refresh::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_RATE_LIMIT_BUCKET};
use tenant_refresh_core::store::keys;
use tenant_refresh_core::{RateLimitPolicy, RefreshSettings, SignatureVerifier, SigningSecrets};

/// Environment variable holding the comma-separated signing secrets
pub const SECRETS_ENV_VAR: &str = "TENANT_REFRESH_SECRETS";

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Refresh webhook settings
    pub webhook: WebhookConfig,

    /// Key-value store settings
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum number of body bytes read from a request
    pub max_body_size: usize,

    /// Take the caller identity from `x-forwarded-for` / `x-real-ip`
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            trust_forwarded_headers: true,
        }
    }
}

/// Refresh webhook configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,

    /// Header carrying `t=<unix-seconds>,v1=<hex>`
    pub signature_header: String,

    /// Header carrying the idempotency id
    pub webhook_id_header: String,

    /// Maximum declared and actual payload size
    pub max_payload_bytes: usize,

    /// Replay window for signature timestamps
    pub max_age_seconds: i64,

    /// Per-caller rate limit
    pub rate_limit: RateLimitConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/api/config/refresh".to_string(),
            signature_header: "x-webhook-signature".to_string(),
            webhook_id_header: "x-webhook-id".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_age_seconds: SignatureVerifier::DEFAULT_MAX_AGE_SECONDS,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Sliding-window rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub limit: u32,

    /// Window length in seconds
    pub window_seconds: u64,

    /// Bucket namespacing this limiter's quota
    pub bucket: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window_seconds: 60,
            bucket: DEFAULT_RATE_LIMIT_BUCKET.to_string(),
        }
    }
}

/// Key-value store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map; only for single-instance deployments and tests
    #[default]
    Memory,
    /// One JSON file per key under `storage.path`
    Filesystem,
}

/// Key-value store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store backend
    pub backend: StorageBackend,

    /// Base directory for the filesystem backend
    pub path: Option<PathBuf>,

    /// Namespace of the response cache
    pub response_cache_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            response_cache_prefix: keys::DEFAULT_RESPONSE_CACHE_PREFIX.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Load a single configuration file
    ///
    /// The format follows the file extension (`.yaml`, `.toml`, `.json`).
    /// Fields absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from(path).required(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check values serde cannot reject on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be non-zero"));
        }

        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be non-zero"));
        }

        let path = &self.webhook.endpoint_path;
        if path.is_empty() || !path.starts_with('/') {
            return Err(invalid(format!(
                "webhook.endpoint_path must be an absolute path, got '{}'",
                path
            )));
        }

        for (field, value) in [
            ("webhook.signature_header", &self.webhook.signature_header),
            ("webhook.webhook_id_header", &self.webhook.webhook_id_header),
        ] {
            if axum::http::HeaderName::from_bytes(value.as_bytes()).is_err() {
                return Err(invalid(format!(
                    "{} is not a valid header name: '{}'",
                    field, value
                )));
            }
        }

        if self.webhook.max_payload_bytes == 0 {
            return Err(invalid("webhook.max_payload_bytes must be non-zero"));
        }

        if self.webhook.max_age_seconds <= 0 {
            return Err(invalid("webhook.max_age_seconds must be positive"));
        }

        let rate_limit = &self.webhook.rate_limit;
        if rate_limit.limit == 0 {
            return Err(invalid("webhook.rate_limit.limit must be non-zero"));
        }
        if rate_limit.window_seconds == 0 {
            return Err(invalid("webhook.rate_limit.window_seconds must be non-zero"));
        }
        if rate_limit.bucket.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "webhook.rate_limit.bucket".to_string(),
            });
        }

        if self.storage.backend == StorageBackend::Filesystem && self.storage.path.is_none() {
            return Err(ConfigError::Missing {
                key: "storage.path".to_string(),
            });
        }

        Ok(())
    }

    /// Pipeline settings derived from this configuration
    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            rate_limit_bucket: self.webhook.rate_limit.bucket.clone(),
            max_payload_bytes: self.webhook.max_payload_bytes,
            max_age_seconds: self.webhook.max_age_seconds,
            response_cache_prefix: self.storage.response_cache_prefix.clone(),
        }
    }

    /// Rate-limit policy derived from this configuration
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.webhook.rate_limit.limit,
            Duration::from_secs(self.webhook.rate_limit.window_seconds),
        )
    }
}

/// Signing secrets from [`SECRETS_ENV_VAR`]; empty when unset
pub fn signing_secrets_from_env() -> SigningSecrets {
    std::env::var(SECRETS_ENV_VAR)
        .map(|value| SigningSecrets::from_comma_separated(&value))
        .unwrap_or_default()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

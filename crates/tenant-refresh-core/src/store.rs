//! # Store Abstractions
//!
//! The pipeline keeps no state of its own. Everything shared between service
//! instances (rate-limit windows, processed markers, cached tenant data)
//! lives behind [`KeyValueStore`]; rendered responses live behind the
//! narrower [`ResponseCache`].
//!
//! Implementations must provide read-your-writes consistency within a
//! process. No cross-region guarantees are assumed.

use async_trait::async_trait;
use serde_json::Value;

/// Errors raised by store implementations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Stored value for '{key}' could not be (de)serialized: {message}")]
    Serialization { key: String, message: String },

    #[error("Store I/O failure: {message}")]
    Io { message: String },
}

impl StoreError {
    /// Check if error is transient and the operation may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Io { .. } => true,
            Self::Serialization { .. } => false,
        }
    }
}

/// Shared key-value store holding JSON values under string keys
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key does not exist
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Create or overwrite a value
    async fn set_item(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove a value; removing a missing key succeeds
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// List every key starting with `prefix`
    async fn get_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Cache of previously rendered responses
///
/// Only removal is needed: dropping an entry forces the next read to be
/// recomputed from fresh configuration.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Remove a cached response; removing a missing key succeeds
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Key layout shared by every component that touches the store
pub mod keys {
    use crate::{TenantId, WebhookId};

    /// Prefix of hostname → tenant id mappings
    pub const TENANT_ID_PREFIX: &str = "tenant:id:";

    /// Prefix of cached tenant configurations
    pub const TENANT_CONFIG_PREFIX: &str = "tenant:config:";

    /// Prefix of processed-webhook markers
    pub const WEBHOOK_PROCESSED_PREFIX: &str = "webhook:processed:";

    /// Prefix of sliding-window request logs
    pub const RATE_LIMIT_PREFIX: &str = "rate-limit:";

    /// Default namespace of the response cache
    pub const DEFAULT_RESPONSE_CACHE_PREFIX: &str = "nitro:handlers";

    /// `tenant:id:<hostname>`
    ///
    /// Takes the raw hostname so alias entries written by other components
    /// can be addressed verbatim.
    pub fn tenant_id(hostname: &str) -> String {
        format!("{}{}", TENANT_ID_PREFIX, hostname)
    }

    /// `tenant:config:<tenantId>`
    pub fn tenant_config(tenant_id: &TenantId) -> String {
        format!("{}{}", TENANT_CONFIG_PREFIX, tenant_id)
    }

    /// `webhook:processed:<webhookId>`
    pub fn webhook_processed(webhook_id: &WebhookId) -> String {
        format!("{}{}", WEBHOOK_PROCESSED_PREFIX, webhook_id)
    }

    /// `rate-limit:<bucket>:<identity>`
    pub fn rate_limit(bucket: &str, identity: &str) -> String {
        format!("{}{}:{}", RATE_LIMIT_PREFIX, bucket, identity)
    }

    /// `<prefix>:tenant:config:<tenantId>` in the response cache
    pub fn response_cache_tenant_config(prefix: &str, tenant_id: &TenantId) -> String {
        format!("{}:{}", prefix, tenant_config(tenant_id))
    }
}

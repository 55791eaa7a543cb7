//! # Tenant Cache
//!
//! Cached tenant identity and configuration in the shared store.
//!
//! Every hostname a tenant is reachable under (the primary `hostname` and
//! each entry of `aliases`) maps to the tenant id via `tenant:id:<hostname>`,
//! and the configuration itself lives under `tenant:config:<tenantId>`. The
//! storefront fills these lazily on first resolution; the refresh pipeline
//! removes them together so no hostname is left pointing at a stale id.

use crate::store::{keys, KeyValueStore, StoreError};
use crate::{Hostname, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cached tenant configuration
///
/// Only the fields the pipeline relies on are typed; everything else the
/// commerce backend returns is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    /// Primary hostname
    pub hostname: Hostname,

    /// Additional hostnames resolving to the same tenant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Hostname>,

    /// Whether the storefront is live
    #[serde(default = "default_is_active")]
    pub is_active: bool,

    /// Remaining backend fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_is_active() -> bool {
    true
}

impl TenantConfig {
    /// Create a config for a single hostname
    pub fn new(hostname: Hostname) -> Self {
        Self {
            hostname,
            aliases: Vec::new(),
            is_active: true,
            extra: Map::new(),
        }
    }

    /// Add alias hostnames
    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = Hostname>) -> Self {
        self.aliases.extend(aliases);
        self
    }

    /// All hostnames the tenant is reachable under, primary first
    pub fn hostnames(&self) -> impl Iterator<Item = &Hostname> {
        std::iter::once(&self.hostname).chain(self.aliases.iter())
    }

    /// Alias strings from a raw cached config
    ///
    /// Cached configs are written by other components and may not match
    /// [`TenantConfig`] exactly, so aliases are read leniently: non-string
    /// and empty entries are skipped, anything that is not an array yields
    /// no aliases.
    pub fn aliases_from_value(config: &Value) -> Vec<String> {
        config
            .get("aliases")
            .and_then(Value::as_array)
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|alias| !alias.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Read/write access to cached tenant data
#[derive(Clone)]
pub struct TenantCache {
    store: Arc<dyn KeyValueStore>,
}

impl TenantCache {
    /// Create new tenant cache over the shared store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Cache a tenant's configuration and map every hostname to its id
    pub async fn remember(
        &self,
        tenant_id: &TenantId,
        config: &TenantConfig,
    ) -> Result<(), StoreError> {
        let config_key = keys::tenant_config(tenant_id);
        let value = serde_json::to_value(config).map_err(|e| StoreError::Serialization {
            key: config_key.clone(),
            message: e.to_string(),
        })?;
        self.store.set_item(&config_key, value).await?;

        for hostname in config.hostnames() {
            self.store
                .set_item(
                    &keys::tenant_id(hostname.as_str()),
                    Value::String(tenant_id.as_str().to_string()),
                )
                .await?;
        }

        debug!(
            tenant_id = %tenant_id,
            hostnames = config.aliases.len() + 1,
            "Cached tenant configuration"
        );
        Ok(())
    }

    /// Tenant id cached for `hostname`, if any
    ///
    /// A mapping that is not a non-empty string is ignored.
    pub async fn resolve(&self, hostname: &Hostname) -> Result<Option<TenantId>, StoreError> {
        let key = keys::tenant_id(hostname.as_str());
        match self.store.get_item(&key).await? {
            None => Ok(None),
            Some(Value::String(id)) => Ok(TenantId::new(id).ok()),
            Some(other) => {
                warn!(key = %key, value = %other, "Ignoring malformed tenant id mapping");
                Ok(None)
            }
        }
    }

    /// Raw cached configuration for `tenant_id`, if any
    pub async fn load_config(&self, tenant_id: &TenantId) -> Result<Option<Value>, StoreError> {
        self.store.get_item(&keys::tenant_config(tenant_id)).await
    }
}

impl std::fmt::Debug for TenantCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;

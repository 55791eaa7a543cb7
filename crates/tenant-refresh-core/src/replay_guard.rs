//! # Replay Guard
//!
//! Durable idempotency markers for processed webhooks.
//!
//! A webhook id absent from the store has never been processed. Markers are
//! never deleted here; they form a permanent dedup ledger subject only to the
//! store's own retention.
//!
//! This is not an authentication mechanism. Consult it only after the
//! signature and timestamp have been verified, otherwise an unauthenticated
//! caller could probe which ids have been used.

use crate::store::{keys, KeyValueStore, StoreError};
use crate::WebhookId;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Processed-webhook ledger over the shared store
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn KeyValueStore>,
}

impl ReplayGuard {
    /// Create new replay guard
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Whether `webhook_id` has already been processed
    pub async fn has_been_processed(&self, webhook_id: &WebhookId) -> Result<bool, StoreError> {
        let marker = self.store.get_item(&keys::webhook_processed(webhook_id)).await?;
        Ok(matches!(marker, Some(Value::Bool(true))))
    }

    /// Record `webhook_id` as processed
    pub async fn mark_processed(&self, webhook_id: &WebhookId) -> Result<(), StoreError> {
        self.store
            .set_item(&keys::webhook_processed(webhook_id), Value::Bool(true))
            .await?;
        debug!(webhook_id = %webhook_id, "Marked webhook as processed");
        Ok(())
    }
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "replay_guard_tests.rs"]
mod tests;

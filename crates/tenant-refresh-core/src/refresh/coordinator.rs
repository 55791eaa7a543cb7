//! The refresh pipeline as an ordered chain of checks.
//!
//! Each stage either hands a refined value to the next one or stops the
//! request with exactly one [`RefreshError`]. Nothing with a side effect on
//! tenant data runs until the caller is authenticated and the payload is
//! known to be well formed.

use super::{InvalidationOutcome, RefreshError, RefreshSettings, WebhookRequest};
use crate::clock::Clock;
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::replay_guard::ReplayGuard;
use crate::signature::{SignatureVerifier, SignedEnvelope, SigningSecrets};
use crate::store::{keys, KeyValueStore, ResponseCache};
use crate::tenant::TenantCache;
use crate::{Hostname, TenantId, WebhookId};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Authenticated-envelope pieces, borrowed from the request
struct Envelope<'a> {
    body: &'a [u8],
    signature_header: &'a str,
    webhook_id: WebhookId,
}

/// Runs inbound refresh webhooks through the validation chain and drops the
/// affected tenant's cached data
pub struct ConfigInvalidationCoordinator {
    store: Arc<dyn KeyValueStore>,
    response_cache: Arc<dyn ResponseCache>,
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
    replay_guard: ReplayGuard,
    tenants: TenantCache,
    settings: RefreshSettings,
}

impl ConfigInvalidationCoordinator {
    /// Create new coordinator over the shared store and response cache
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        response_cache: Arc<dyn ResponseCache>,
        clock: Arc<dyn Clock>,
        policy: RateLimitPolicy,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(store.clone(), clock.clone(), policy),
            replay_guard: ReplayGuard::new(store.clone()),
            tenants: TenantCache::new(store.clone()),
            store,
            response_cache,
            clock,
            settings,
        }
    }

    /// Settings this coordinator runs with
    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Process one refresh webhook
    ///
    /// # Errors
    ///
    /// The first failing stage decides the error. Store failures surface as
    /// [`RefreshError::Store`]; a failure while invalidating leaves the
    /// webhook unmarked so the sender's retry is processed again.
    #[instrument(
        skip(self, request),
        fields(client_ip = %request.client_ip, webhook_id = ?request.webhook_id)
    )]
    pub async fn process(
        &self,
        request: &WebhookRequest,
    ) -> Result<InvalidationOutcome, RefreshError> {
        self.check_rate_limit(&request.client_ip).await?;
        let secrets = require_secrets(&request.secrets)?;
        check_size(request, self.settings.max_payload_bytes)?;
        let envelope = require_envelope(request)?;
        let signed = parse_signature_header(envelope.signature_header)?;
        verify_signature(&signed, envelope.body, secrets)?;
        self.check_freshness(&signed)?;
        let hostname = validate_payload(envelope.body)?;
        self.check_replay(&envelope.webhook_id).await?;
        let (tenant_id, resolved_from_cache) = self.resolve_tenant(&hostname).await?;
        let config = self.tenants.load_config(&tenant_id).await?;
        let outcome = self
            .invalidate(hostname, tenant_id, resolved_from_cache, config.as_ref())
            .await?;
        self.replay_guard.mark_processed(&envelope.webhook_id).await?;

        info!(
            hostname = %outcome.hostname,
            tenant_id = %outcome.tenant_id,
            removed = outcome.removed_keys.len(),
            "Tenant configuration invalidated"
        );
        Ok(outcome)
    }

    async fn check_rate_limit(&self, client_ip: &str) -> Result<(), RefreshError> {
        let decision = self
            .rate_limiter
            .check(client_ip, &self.settings.rate_limit_bucket)
            .await?;
        if decision.allowed {
            return Ok(());
        }

        Err(RefreshError::RateLimited {
            retry_after_seconds: decision.retry_after_seconds(self.clock.now()),
            reset_at: decision.reset_at,
        })
    }

    fn check_freshness(&self, signed: &SignedEnvelope) -> Result<(), RefreshError> {
        let now = self.clock.now_unix_seconds();
        if SignatureVerifier::validate_freshness(signed.timestamp, now, self.settings.max_age_seconds)
        {
            return Ok(());
        }

        warn!(
            timestamp = signed.timestamp,
            now = now,
            max_age_seconds = self.settings.max_age_seconds,
            "Rejecting webhook: timestamp outside replay window"
        );
        Err(RefreshError::Unauthorized)
    }

    async fn check_replay(&self, webhook_id: &WebhookId) -> Result<(), RefreshError> {
        if self.replay_guard.has_been_processed(webhook_id).await? {
            info!(webhook_id = %webhook_id, "Webhook already processed");
            return Err(RefreshError::Conflict {
                webhook_id: webhook_id.to_string(),
            });
        }
        Ok(())
    }

    /// Cached tenant id for `hostname`, or the hostname itself
    async fn resolve_tenant(&self, hostname: &Hostname) -> Result<(TenantId, bool), RefreshError> {
        match self.tenants.resolve(hostname).await? {
            Some(tenant_id) => Ok((tenant_id, true)),
            None => {
                debug!(hostname = %hostname, "No cached tenant id, using hostname");
                Ok((TenantId::from_hostname(hostname), false))
            }
        }
    }

    /// Remove every cache entry derived from the tenant's configuration
    ///
    /// The payload hostname, the cached primary hostname and every alias are
    /// unmapped, then the config itself and its rendered response.
    async fn invalidate(
        &self,
        hostname: Hostname,
        tenant_id: TenantId,
        resolved_from_cache: bool,
        config: Option<&Value>,
    ) -> Result<InvalidationOutcome, RefreshError> {
        let mut hostnames = vec![hostname.as_str().to_string()];
        if let Some(config) = config {
            let primary = config
                .get("hostname")
                .and_then(Value::as_str)
                .filter(|primary| !primary.is_empty())
                .map(str::to_string);
            for name in primary
                .into_iter()
                .chain(crate::tenant::TenantConfig::aliases_from_value(config))
            {
                if !hostnames.contains(&name) {
                    hostnames.push(name);
                }
            }
        }

        let mut removed_keys: Vec<String> =
            hostnames.iter().map(|name| keys::tenant_id(name)).collect();
        removed_keys.push(keys::tenant_config(&tenant_id));

        for key in &removed_keys {
            if let Err(e) = self.store.remove_item(key).await {
                error!(key = %key, error = %e, "Failed to remove cached tenant entry");
                return Err(e.into());
            }
        }

        let response_cache_key =
            keys::response_cache_tenant_config(&self.settings.response_cache_prefix, &tenant_id);
        if let Err(e) = self.response_cache.remove_item(&response_cache_key).await {
            error!(key = %response_cache_key, error = %e, "Failed to remove cached response");
            return Err(e.into());
        }

        Ok(InvalidationOutcome {
            hostname,
            tenant_id,
            resolved_from_cache,
            removed_keys,
            response_cache_key,
        })
    }
}

impl std::fmt::Debug for ConfigInvalidationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigInvalidationCoordinator")
            .field("policy", &self.rate_limiter.policy())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Stateless stages
// ============================================================================

fn require_secrets(secrets: &SigningSecrets) -> Result<&SigningSecrets, RefreshError> {
    if secrets.is_empty() {
        error!("No webhook signing secrets configured; rejecting refresh webhook");
        return Err(RefreshError::Misconfigured);
    }
    Ok(secrets)
}

fn check_size(request: &WebhookRequest, max_size: usize) -> Result<(), RefreshError> {
    let actual = request.body_len() as u64;
    let size = request.declared_length.max(actual);
    if size > max_size as u64 {
        warn!(
            declared = request.declared_length,
            actual = actual,
            max_size = max_size,
            "Rejecting webhook: payload too large"
        );
        return Err(RefreshError::PayloadTooLarge { size, max_size });
    }
    Ok(())
}

fn require_envelope(request: &WebhookRequest) -> Result<Envelope<'_>, RefreshError> {
    let (Some(body), Some(signature_header), Some(webhook_id)) = (
        request.raw_body.as_deref().filter(|body| !body.is_empty()),
        request.signature.as_deref().filter(|sig| !sig.is_empty()),
        request.webhook_id.as_deref(),
    ) else {
        warn!(
            has_body = request.raw_body.is_some(),
            has_signature = request.signature.is_some(),
            has_webhook_id = request.webhook_id.is_some(),
            "Rejecting webhook: incomplete envelope"
        );
        return Err(RefreshError::Unauthorized);
    };

    let webhook_id = WebhookId::new(webhook_id).map_err(|e| {
        warn!(error = %e, "Rejecting webhook: invalid webhook id");
        RefreshError::Unauthorized
    })?;

    Ok(Envelope {
        body,
        signature_header,
        webhook_id,
    })
}

fn parse_signature_header(header: &str) -> Result<SignedEnvelope, RefreshError> {
    SignatureVerifier::parse_header(header).map_err(|e| {
        warn!(error = %e, "Rejecting webhook: malformed signature header");
        RefreshError::Unauthorized
    })
}

fn verify_signature(
    signed: &SignedEnvelope,
    body: &[u8],
    secrets: &SigningSecrets,
) -> Result<(), RefreshError> {
    let payload = SignatureVerifier::signed_payload(signed.timestamp, body);
    if SignatureVerifier::verify(&payload, &signed.signature, secrets) {
        return Ok(());
    }

    warn!(
        secrets_tried = secrets.len(),
        "Rejecting webhook: signature mismatch"
    );
    Err(RefreshError::Unauthorized)
}

/// Extract the hostname from an authenticated body
fn validate_payload(body: &[u8]) -> Result<Hostname, RefreshError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| RefreshError::UnprocessablePayload {
            message: format!("body is not valid JSON: {}", e),
        })?;

    let hostname = payload
        .get("hostname")
        .and_then(Value::as_str)
        .filter(|hostname| !hostname.is_empty())
        .ok_or_else(|| RefreshError::UnprocessablePayload {
            message: "missing or empty 'hostname' field".to_string(),
        })?;

    Hostname::new(hostname).map_err(|e| RefreshError::UnprocessablePayload {
        message: e.to_string(),
    })
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;

//! Common test utilities for tenant-refresh integration tests
//!
//! This module provides:
//! - A router wired to in-memory stores and a frozen clock
//! - Tenant seeding through the same cache the service uses
//! - Signed request builders

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tenant_refresh_api::{create_router, AppState, RefreshMetrics, ServiceConfig};
use tenant_refresh_core::{
    Hostname, InMemoryKeyValueStore, KeyValueStore, ManualClock, SignatureVerifier,
    SigningSecrets, TenantCache, TenantConfig, TenantId,
};

#[allow(dead_code)]
pub const SECRET: &str = "whsec_current";

#[allow(dead_code)]
pub const PREVIOUS_SECRET: &str = "whsec_previous";

/// Frozen wall-clock time of every test app
pub const NOW: i64 = 1_700_000_000;

#[allow(dead_code)]
pub const CLIENT_IP: &str = "198.51.100.20";

// ============================================================================
// Test application
// ============================================================================

/// Router plus handles on everything it writes to
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub store: InMemoryKeyValueStore,
    pub responses: InMemoryKeyValueStore,
    pub clock: ManualClock,
    pub metrics: Arc<RefreshMetrics>,
}

impl TestApp {
    /// Default configuration, current and previous secret
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    #[allow(dead_code)]
    pub fn with_config(config: ServiceConfig) -> Self {
        Self::with_config_and_secrets(
            config,
            SigningSecrets::new(vec![SECRET.to_string(), PREVIOUS_SECRET.to_string()]),
        )
    }

    #[allow(dead_code)]
    pub fn with_config_and_secrets(config: ServiceConfig, secrets: SigningSecrets) -> Self {
        let store = InMemoryKeyValueStore::new();
        let responses = InMemoryKeyValueStore::new();
        let clock = ManualClock::at_unix_seconds(NOW);

        let state = AppState::build(
            config,
            Arc::new(store.clone()),
            Arc::new(responses.clone()),
            Arc::new(clock.clone()),
            secrets,
        )
        .expect("app state");
        let metrics = state.metrics.clone();

        Self {
            router: create_router(state),
            store,
            responses,
            clock,
            metrics,
        }
    }

    /// Send one request through a clone of the router
    #[allow(dead_code)]
    pub async fn send(&self, request: Request<Body>) -> Response {
        use tower::ServiceExt;

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Cache a tenant under its primary hostname and aliases
#[allow(dead_code)]
pub async fn seed_tenant(
    store: &InMemoryKeyValueStore,
    tenant_id: &str,
    hostname: &str,
    aliases: &[&str],
) {
    let cache = TenantCache::new(Arc::new(store.clone()));
    let config = TenantConfig::new(Hostname::new(hostname).unwrap()).with_aliases(
        aliases
            .iter()
            .map(|alias| Hostname::new(*alias).unwrap()),
    );

    cache
        .remember(&TenantId::new(tenant_id).unwrap(), &config)
        .await
        .unwrap();
}

/// Store a rendered response for a tenant
#[allow(dead_code)]
pub async fn seed_response(responses: &InMemoryKeyValueStore, tenant_id: &str) {
    responses
        .set_item(
            &format!("nitro:handlers:tenant:config:{}", tenant_id),
            serde_json::json!({ "body": "<html>cached</html>" }),
        )
        .await
        .unwrap();
}

/// Refresh body for a hostname
#[allow(dead_code)]
pub fn refresh_body(hostname: &str) -> String {
    serde_json::json!({ "hostname": hostname }).to_string()
}

/// Refresh request signed with [`SECRET`] at [`NOW`]
#[allow(dead_code)]
pub fn signed_refresh(body: &str, webhook_id: &str) -> Request<Body> {
    signed_refresh_with(body, webhook_id, SECRET, NOW, CLIENT_IP)
}

#[allow(dead_code)]
pub fn signed_refresh_with(
    body: &str,
    webhook_id: &str,
    secret: &str,
    timestamp: i64,
    client_ip: &str,
) -> Request<Body> {
    let signature = SignatureVerifier::sign(timestamp, body.as_bytes(), secret).unwrap();

    Request::builder()
        .method("POST")
        .uri("/api/config/refresh")
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .header("x-webhook-signature", signature)
        .header("x-webhook-id", webhook_id)
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Whether a rendered response is still cached for a tenant
#[allow(dead_code)]
pub fn response_cached(responses: &InMemoryKeyValueStore, tenant_id: &str) -> bool {
    responses.contains_key(&format!("nitro:handlers:tenant:config:{}", tenant_id))
}

//! # Tenant-Refresh HTTP Service
//!
//! HTTP surface for the config-refresh webhook.
//!
//! This service provides:
//! - The signed refresh endpoint (`POST /api/config/refresh` by default)
//! - Liveness and readiness endpoints
//! - Prometheus metrics
//!
//! Everything the pipeline decides lives in `tenant-refresh-core`; this crate
//! only translates HTTP requests into [`WebhookRequest`]s and errors into
//! responses.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tenant_refresh_core::{
    Clock, ConfigInvalidationCoordinator, KeyValueStore, ResponseCache, SigningSecrets,
    WebhookRequest,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

pub use crate::config::{
    signing_secrets_from_env, LoggingConfig, RateLimitConfig, ServerConfig, ServiceConfig,
    StorageBackend, StorageConfig, WebhookConfig, SECRETS_ENV_VAR,
};
pub use crate::errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use crate::metrics::RefreshMetrics;
pub use crate::responses::{HealthResponse, ReadinessResponse, RefreshResponse};

/// Header used to correlate log lines of one request
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Key prefix listed by the readiness probe
const READINESS_PROBE_PREFIX: &str = "health:probe:";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Refresh pipeline
    pub coordinator: Arc<ConfigInvalidationCoordinator>,

    /// Shared store, probed for readiness
    pub store: Arc<dyn KeyValueStore>,

    /// Signing secrets, newest first
    pub secrets: SigningSecrets,

    /// Metrics collector for observability
    pub metrics: Arc<RefreshMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        coordinator: Arc<ConfigInvalidationCoordinator>,
        store: Arc<dyn KeyValueStore>,
        secrets: SigningSecrets,
        metrics: Arc<RefreshMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            coordinator,
            store,
            secrets,
            metrics,
        }
    }

    /// Wire a coordinator and metrics from configuration
    pub fn build(
        config: ServiceConfig,
        store: Arc<dyn KeyValueStore>,
        response_cache: Arc<dyn ResponseCache>,
        clock: Arc<dyn Clock>,
        secrets: SigningSecrets,
    ) -> Result<Self, ServiceError> {
        let metrics = RefreshMetrics::new().map_err(|e| {
            ServiceError::Configuration(ConfigError::Invalid {
                message: format!("Failed to initialize metrics: {}", e),
            })
        })?;

        let coordinator = ConfigInvalidationCoordinator::new(
            store.clone(),
            response_cache,
            clock,
            config.rate_limit_policy(),
            config.refresh_settings(),
        );

        Ok(Self::new(
            config,
            Arc::new(coordinator),
            store,
            secrets,
            Arc::new(metrics),
        ))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("secrets", &self.secrets)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            &state.config.webhook.endpoint_path,
            post(handle_config_refresh),
        )
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until SIGINT/SIGTERM
///
/// In-flight requests get `server.shutdown_timeout_seconds` to finish after
/// the signal; whatever is still running then is dropped.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let server_config = state.config.server.clone();
    let address = format!("{}:{}", server_config.host, server_config.port);
    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!(address = %address, "Starting HTTP server");

    let shutdown_timeout = Duration::from_secs(server_config.shutdown_timeout_seconds);
    let shutdown_started = Arc::new(tokio::sync::Notify::new());
    let notify = shutdown_started.clone();

    let app = create_router(state);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!(
            timeout_seconds = shutdown_timeout.as_secs(),
            "Initiating graceful shutdown"
        );
        notify.notify_one();
    });

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = async {
            shutdown_started.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Graceful shutdown timed out; dropping in-flight requests");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Refresh Handler
// ============================================================================

/// Handle a config-refresh webhook
///
/// The body is read up to the larger of `server.max_body_size` and the
/// pipeline's payload bound. A body that cannot be read within that cap is
/// passed on as oversized so the pipeline still rate limits first.
#[instrument(skip(state, request), fields(client_ip))]
pub async fn handle_config_refresh(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<RefreshResponse>, WebhookHandlerError> {
    let start = std::time::Instant::now();
    let (parts, body) = request.into_parts();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_identity(
        &parts.headers,
        peer,
        state.config.server.trust_forwarded_headers,
    );
    tracing::Span::current().record("client_ip", client_ip.as_str());

    let declared_length = content_length(&parts.headers);
    let read_cap = state
        .config
        .server
        .max_body_size
        .max(state.config.webhook.max_payload_bytes);

    let mut webhook_request = WebhookRequest::new(client_ip, state.secrets.clone())
        .with_declared_length(declared_length);

    match axum::body::to_bytes(body, read_cap).await {
        Ok(bytes) => webhook_request = webhook_request.with_body(bytes),
        Err(e) => {
            warn!(error = %e, read_cap = read_cap, "Request body not readable within limit");
            webhook_request.declared_length = declared_length.max(read_cap as u64 + 1);
        }
    }

    if let Some(signature) = header_str(&parts.headers, &state.config.webhook.signature_header) {
        webhook_request = webhook_request.with_signature(signature);
    }
    if let Some(webhook_id) = header_str(&parts.headers, &state.config.webhook.webhook_id_header)
    {
        webhook_request = webhook_request.with_webhook_id(webhook_id);
    }

    let result = state.coordinator.process(&webhook_request).await;
    state
        .metrics
        .observe_duration(start.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            state.metrics.record_outcome(metrics::OUTCOME_INVALIDATED);
            state
                .metrics
                .record_keys_removed(outcome.removed_keys.len() as u64 + 1);
            Ok(Json(RefreshResponse { invalidated: true }))
        }
        Err(e) => {
            state.metrics.record_outcome(e.kind());
            Err(e.into())
        }
    }
}

/// Caller identity used for rate limiting
///
/// With `trust_forwarded` the first `x-forwarded-for` entry wins, then
/// `x-real-ip`. Otherwise, or when neither is present, the socket peer
/// address; `"unknown"` when even that is missing.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    if trust_forwarded {
        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        if let Some(ip) = header_str(headers, "x-real-ip")
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Declared `content-length`; absent or unparseable reads as 0
fn content_length(headers: &HeaderMap) -> u64 {
    header_str(headers, "content-length")
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness endpoint: the store answers and secrets are configured
#[instrument(skip(state))]
async fn handle_readiness_check(State(state): State<AppState>) -> Response {
    let store = match state.store.get_keys_with_prefix(READINESS_PROBE_PREFIX).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Readiness probe failed: store unavailable");
            false
        }
    };
    let secrets_configured = !state.secrets.is_empty();
    let ready = store && secrets_configured;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            store,
            secrets_configured,
            timestamp: chrono::Utc::now(),
        }),
    )
        .into_response()
}

/// Prometheus text exposition
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Correlation id of the current request, available as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Request logging middleware with correlation ID tracking
///
/// Reuses the caller's `x-correlation-id` or generates one, records it on the
/// span, and echoes it on the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: Request,
    next: middleware::Next,
) -> Response {
    let start = std::time::Instant::now();

    let correlation_id = header_str(request.headers(), CORRELATION_ID_HEADER)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(status = %status, duration_ms = %duration_ms, "Request completed with server error");
    } else if status.is_client_error() {
        warn!(status = %status, duration_ms = %duration_ms, "Request completed with client error");
    } else {
        info!(status = %status, duration_ms = %duration_ms, "Request completed successfully");
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

//! # Tenant-Refresh Service
//!
//! Binary entry point for the config-refresh webhook service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Opens the configured key-value store
//! - Starts the HTTP server from tenant-refresh-api

use std::sync::Arc;
use tenant_refresh_api::{
    signing_secrets_from_env, start_server, AppState, LoggingConfig, ServiceConfig, ServiceError,
    StorageBackend, SECRETS_ENV_VAR,
};
use tenant_refresh_core::{
    FilesystemKeyValueStore, InMemoryKeyValueStore, KeyValueStore, ResponseCache, SystemClock,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Explicit configuration file chosen by the operator
const CONFIG_FILE_ENV_VAR: &str = "TENANT_REFRESH_CONFIG_FILE";

/// Prefix of environment overrides, e.g. `TR__SERVER__PORT=9090`
const ENV_PREFIX: &str = "TR";

const EXIT_CONFIGURATION: i32 = 3;

#[tokio::main]
async fn main() {
    let service_config = match load_config() {
        Ok(config) => config,
        Err(message) => {
            init_logging(&LoggingConfig::default());
            error!(error = %message, "Failed to load configuration; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    init_logging(&service_config.logging);
    info!("Starting Tenant-Refresh Service");

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(EXIT_CONFIGURATION);
    }

    let secrets = signing_secrets_from_env();
    if secrets.is_empty() {
        error!(
            env_var = SECRETS_ENV_VAR,
            "No webhook signing secrets configured; every refresh request will be rejected \
             until the service is restarted with secrets"
        );
    } else {
        info!(secret_count = secrets.len(), "Loaded webhook signing secrets");
    }

    let (store, response_cache) = match open_store(&service_config).await {
        Ok(stores) => stores,
        Err(message) => {
            error!(error = %message, "Failed to open key-value store; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.webhook.endpoint_path,
        "Starting HTTP server"
    );

    let result = AppState::build(
        service_config,
        store,
        response_cache,
        Arc::new(SystemClock),
        secrets,
    );
    let state = match result {
        Ok(state) => state,
        Err(e) => exit_with(e),
    };

    if let Err(e) = start_server(state).await {
        exit_with(e);
    }
}

// ============================================================================
// Private helpers
// ============================================================================

fn exit_with(e: ServiceError) -> ! {
    error!(error = %e, "Service failed");

    let exit_code = match e {
        ServiceError::BindFailed { .. } => 1,
        ServiceError::ServerFailed { .. } => 2,
        ServiceError::Configuration(_) => EXIT_CONFIGURATION,
    };

    std::process::exit(exit_code);
}

/// Layer configuration sources, later ones overriding earlier ones
///
///  1. /etc/tenant-refresh/service.yaml   (system-wide defaults)
///  2. ./config/service.yaml              (deployment-local override)
///  3. Path given by TENANT_REFRESH_CONFIG_FILE
///  4. Environment variables prefixed TR__ (double-underscore separator)
///
/// Absent files are fine since every field has a default. A malformed file
/// or an override that cannot be coerced is a hard error.
fn load_config() -> Result<ServiceConfig, String> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/tenant-refresh/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var(CONFIG_FILE_ENV_VAR) {
        if !explicit_path.is_empty() {
            builder = builder.add_source(config::File::with_name(&explicit_path).required(true));
        }
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| e.to_string())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_store(
    config: &ServiceConfig,
) -> Result<(Arc<dyn KeyValueStore>, Arc<dyn ResponseCache>), String> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory store; rate limits and markers are not shared between instances");
            let store = Arc::new(InMemoryKeyValueStore::new());
            let response_cache: Arc<dyn ResponseCache> = store.clone();
            let store: Arc<dyn KeyValueStore> = store;
            Ok((store, response_cache))
        }
        StorageBackend::Filesystem => {
            let path = config
                .storage
                .path
                .clone()
                .ok_or_else(|| "storage.path is required for the filesystem backend".to_string())?;
            info!(path = %path.display(), "Using filesystem store");
            let store = Arc::new(
                FilesystemKeyValueStore::new(path)
                    .await
                    .map_err(|e| e.to_string())?,
            );
            let response_cache: Arc<dyn ResponseCache> = store.clone();
            let store: Arc<dyn KeyValueStore> = store;
            Ok((store, response_cache))
        }
    }
}

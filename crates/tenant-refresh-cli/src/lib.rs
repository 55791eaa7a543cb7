//! # Tenant-Refresh CLI
//!
//! Operator tooling for the config-refresh webhook.
//!
//! This module provides CLI commands for:
//! - Producing a signature header for a body
//! - Sending a signed refresh for a hostname to a running service
//! - Validating a service configuration file

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tenant_refresh_api::{ConfigError, ServiceConfig};
use tenant_refresh_core::{SignatureError, SignatureVerifier};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Environment variable the signing secret may be read from
pub const SECRET_ENV_VAR: &str = "TENANT_REFRESH_SECRET";

// ============================================================================
// CLI Structure
// ============================================================================

/// Tenant-Refresh CLI - sign and send storefront config-refresh webhooks
#[derive(Parser, Debug)]
#[command(name = "tenant-refresh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sign and send tenant config-refresh webhooks")]
pub struct Cli {
    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the signature header value for a body
    Sign {
        /// Signing secret
        #[arg(long, env = SECRET_ENV_VAR, hide_env_values = true)]
        secret: String,

        /// Unix timestamp to sign at (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        /// Body to sign
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,

        /// File holding the body to sign
        #[arg(long)]
        body_file: Option<PathBuf>,
    },

    /// Send a signed refresh for a hostname
    Send {
        /// Refresh endpoint URL
        #[arg(long)]
        url: String,

        /// Signing secret
        #[arg(long, env = SECRET_ENV_VAR, hide_env_values = true)]
        secret: String,

        /// Hostname whose configuration changed
        #[arg(long)]
        hostname: String,

        /// Idempotency id (defaults to a fresh UUID)
        #[arg(long)]
        webhook_id: Option<String>,

        /// Header carrying the signature
        #[arg(long, default_value = "x-webhook-signature")]
        signature_header: String,

        /// Header carrying the webhook id
        #[arg(long, default_value = "x-webhook-id")]
        webhook_id_header: String,
    },

    /// Validate a service configuration file
    Config {
        /// Configuration file to validate
        #[arg(short, long)]
        file: PathBuf,

        /// Print the resolved configuration as TOML
        #[arg(short, long)]
        show: bool,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signing failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("Request failed: {0:#}")]
    Request(#[from] anyhow::Error),

    #[error("Refresh rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::InvalidArgument { .. } => 2,
            Self::Rejected { .. } => 3,
            Self::Request(_) => 4,
            Self::Io(_) => 5,
            Self::Signature(_) => 6,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Options of the `send` command
#[derive(Clone)]
pub struct SendOptions {
    pub url: String,
    pub secret: Zeroizing<String>,
    pub hostname: String,
    pub webhook_id: String,
    pub signature_header: String,
    pub webhook_id_header: String,
}

/// Response of an accepted refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub status: u16,
    pub body: String,
}

/// Signature header value for `body` signed at `timestamp`
pub fn sign_body(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, CliError> {
    if secret.is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "secret".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    Ok(SignatureVerifier::sign(timestamp, body, secret)?)
}

/// JSON body of a refresh for `hostname`
pub fn refresh_body(hostname: &str) -> Result<String, CliError> {
    if hostname.trim().is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "hostname".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    Ok(serde_json::json!({ "hostname": hostname }).to_string())
}

/// Sign and POST a refresh
///
/// Returns the response for any 2xx status and [`CliError::Rejected`]
/// otherwise.
pub async fn send_refresh(options: &SendOptions) -> Result<SendOutcome, CliError> {
    let body = refresh_body(&options.hostname)?;
    let timestamp = chrono::Utc::now().timestamp();
    let signature = sign_body(&options.secret, timestamp, body.as_bytes())?;

    debug!(
        url = %options.url,
        webhook_id = %options.webhook_id,
        timestamp = timestamp,
        "Sending refresh webhook"
    );

    let response = reqwest::Client::new()
        .post(&options.url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(options.signature_header.as_str(), signature)
        .header(options.webhook_id_header.as_str(), options.webhook_id.as_str())
        .body(body)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", options.url))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read response body")?;

    if !status.is_success() {
        return Err(CliError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    info!(status = status.as_u16(), "Refresh accepted");
    Ok(SendOutcome {
        status: status.as_u16(),
        body,
    })
}

/// Load and validate a configuration file
///
/// Returns a one-line summary, or the resolved configuration as TOML when
/// `show` is set.
pub fn check_config(file: &Path, show: bool) -> Result<String, CliError> {
    let config = ServiceConfig::from_file(file)?;
    config.validate()?;

    if show {
        return toml::to_string_pretty(&config).map_err(|e| {
            CliError::Configuration(ConfigError::Invalid {
                message: format!("cannot render configuration: {}", e),
            })
        });
    }

    Ok(format!(
        "Configuration is valid: {} listening on {}:{}",
        config.webhook.endpoint_path, config.server.host, config.server.port
    ))
}

/// Execute a parsed command and return what should be printed
pub async fn execute(command: Commands) -> Result<String, CliError> {
    match command {
        Commands::Sign {
            secret,
            timestamp,
            body,
            body_file,
        } => {
            let secret = Zeroizing::new(secret);
            let body = match (body, body_file) {
                (Some(body), _) => body.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path).await?,
                (None, None) => {
                    return Err(CliError::InvalidArgument {
                        arg: "body".to_string(),
                        message: "either --body or --body-file is required".to_string(),
                    })
                }
            };
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
            sign_body(&secret, timestamp, &body)
        }
        Commands::Send {
            url,
            secret,
            hostname,
            webhook_id,
            signature_header,
            webhook_id_header,
        } => {
            let options = SendOptions {
                url,
                secret: Zeroizing::new(secret),
                hostname,
                webhook_id: webhook_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                signature_header,
                webhook_id_header,
            };
            let outcome = send_refresh(&options).await?;
            Ok(format!("{} {}", outcome.status, outcome.body))
        }
        Commands::Config { file, show } => check_config(&file, show),
    }
}

/// Parse arguments, initialize logging and run the command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli);

    let output = execute(cli.command).await?;
    println!("{}", output);
    Ok(())
}

/// Log to stderr so command output stays pipeable
fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

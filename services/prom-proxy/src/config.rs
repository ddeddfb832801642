//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The Azure client secret is loaded from the AZURE_CLIENT_SECRET env var
//! or client_secret_file, never stored in the TOML directly to avoid
//! leaking secrets. All validation happens here, before the credential
//! core initializes.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Accepted log levels, matched case-insensitively.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub azure: AzureConfig,
}

/// HTTP proxy settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    /// Base URL of the upstream Prometheus-compatible query endpoint
    pub prometheus_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Azure AD credential settings
#[derive(Debug, Deserialize)]
pub struct AzureConfig {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to the
    /// AZURE_CLIENT_SECRET env var). When neither yields a secret, the
    /// proxy runs in federated workload-identity mode.
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables.
    ///
    /// Client secret resolution order:
    /// 1. AZURE_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.proxy.prometheus_url.starts_with("http://")
            && !config.proxy.prometheus_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "prometheus_url must start with http:// or https://, got: {}",
                config.proxy.prometheus_url
            )));
        }

        if !LOG_LEVELS
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&config.proxy.log_level))
        {
            return Err(common::Error::Config(format!(
                "invalid log level {:?}, allowed values are: {LOG_LEVELS:?}",
                config.proxy.log_level
            )));
        }

        if config.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.azure.tenant_id.is_empty() {
            return Err(common::Error::Config("tenant_id must be set".into()));
        }

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("AZURE_CLIENT_SECRET") {
            config.azure.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.azure.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.azure.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("prometheus-proxy.toml")
    }
}

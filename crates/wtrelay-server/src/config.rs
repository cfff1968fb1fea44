//! Server configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wtrelay_core::{RelayError, RelayResult};

pub const DEFAULT_PATH: &str = "/webtransport";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_cert_path")]
    pub cert: String,
    #[serde(default = "default_key_path")]
    pub key: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_path(),
            cert: default_cert_path(),
            key: default_key_path(),
            keep_alive_secs: default_keep_alive_secs(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// `[metrics]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_port() -> u16 {
    8000
}
fn default_path() -> String {
    DEFAULT_PATH.to_string()
}
fn default_cert_path() -> String {
    "cert.pem".to_string()
}
fn default_key_path() -> String {
    "key.pem".to_string()
}
fn default_keep_alive_secs() -> u64 {
    3
}
fn default_max_message_size() -> usize {
    1_048_576
}
fn default_metrics_port() -> u16 {
    8001
}
fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub path: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub keep_alive: Option<Duration>,
    pub max_message_size: usize,
    pub metrics_port: u16,
    pub metrics_path: String,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_metrics_port: Option<u16>,
        cli_cert: Option<&str>,
        cli_key: Option<&str>,
    ) -> RelayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded).map_err(|e| {
                        RelayError::Config(format!("cannot read {}: {e}", expanded.display()))
                    })?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let cert_str = cli_cert
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.cert);
        let key_str = cli_key
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.key);

        let config = Self {
            port: cli_port.unwrap_or(file_config.server.port),
            path: file_config.server.path,
            cert_path: expand_tilde_str(&cert_str),
            key_path: expand_tilde_str(&key_str),
            keep_alive: match file_config.server.keep_alive_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_message_size: file_config.server.max_message_size,
            metrics_port: cli_metrics_port.unwrap_or(file_config.metrics.port),
            metrics_path: file_config.metrics.path,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> RelayResult<()> {
        for (name, path) in [("server.path", &self.path), ("metrics.path", &self.metrics_path)] {
            if !path.starts_with('/') {
                return Err(RelayError::Config(format!(
                    "{name} must start with '/': {path:?}"
                )));
            }
        }
        if self.max_message_size == 0 {
            return Err(RelayError::Config(
                "server.max_message_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse(content: &str) -> RelayResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| RelayError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

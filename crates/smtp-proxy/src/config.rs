use serde::Deserialize;
use std::path::{Path, PathBuf};

use tcp_relay::DEFAULT_CHUNK_SIZE;

/// Smallest accepted read size: one full RFC 5321 command line, twice over.
const MIN_CHUNK_SIZE: usize = DEFAULT_CHUNK_SIZE;
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub relay: RelayTuning,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_local")]
    pub local_addr: String,
    #[serde(default = "default_remote")]
    pub remote_addr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_addr: default_local(),
            remote_addr: default_remote(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Session log destination (JSON lines, append mode).
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub verbose: bool,
    /// Diagnostic tracing level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            verbose: false,
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelayTuning {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_local() -> String {
    "0.0.0.0:25".to_string()
}

fn default_remote() -> String {
    "127.0.0.1:2525".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("smtp-proxy.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `None` for a missing file; the caller falls back to the defaults
/// and warns once tracing is up, so the proxy runs with flags alone.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(Some(config))
}

impl Config {
    /// Reject settings the relay cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.local_addr.trim().is_empty() {
            anyhow::bail!("network.local_addr must not be empty");
        }
        if self.network.remote_addr.trim().is_empty() {
            anyhow::bail!("network.remote_addr must not be empty");
        }
        if self.logging.log_file.as_os_str().is_empty() {
            anyhow::bail!("logging.log_file must not be empty");
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.relay.chunk_size) {
            anyhow::bail!(
                "relay.chunk_size must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE}, got {}",
                self.relay.chunk_size
            );
        }
        Ok(())
    }
}

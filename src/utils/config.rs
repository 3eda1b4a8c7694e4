// src/utils/config.rs
//! Host configuration
//!
//! Loaded in layers: serde defaults, then an optional YAML file, then
//! `HOSTED__*` environment variables (`HOSTED__SESSION__TIMEOUT_SECS=30`).

use crate::runtime::output::FlushPolicy;
use crate::runtime::quota::QuotaLimits;
use crate::utils::errors::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/host.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HOSTED";

/// Top-level host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub session: SessionConfig,
    pub quotas: QuotaLimits,
    pub transport: TransportConfig,
    pub content: ContentConfig,
    pub logging: LoggingConfig,
    pub catalog: CatalogConfig,
}

/// Per-session execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard limit on hosted program run time
    pub timeout_secs: u64,

    /// How long before the deadline the client gets a warning
    pub timeout_warning_secs: u64,

    /// Background flush timer period
    pub flush_interval_ms: u64,

    /// Console flush contract
    pub flush_policy: FlushPolicy,

    /// Canonical entry-point name
    pub entry_symbol: String,

    /// Source files with this extension are routed to the compiler
    pub code_extension: String,

    /// Slice length used by blocking input reads to re-check cancellation
    pub input_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            timeout_warning_secs: 10,
            flush_interval_ms: 50,
            flush_policy: FlushPolicy::AutoFlush,
            entry_symbol: "main".to_string(),
            code_extension: "java".to_string(),
            input_poll_interval_ms: 100,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn timeout_warning(&self) -> Duration {
        Duration::from_secs(self.timeout_warning_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn input_poll_interval(&self) -> Duration {
        Duration::from_millis(self.input_poll_interval_ms)
    }
}

/// Transport-facing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Deliver messages whose send policy is conditional (validation runs)
    pub send_conditional_messages: bool,
}

/// Local content store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub base_dir: PathBuf,
    pub upload_url_ttl_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("hosted-runtime").join("content"),
            upload_url_ttl_secs: 300,
        }
    }
}

impl ContentConfig {
    pub fn upload_url_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_url_ttl_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Message catalog settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// YAML file overlaying the built-in catalog
    pub path: Option<PathBuf>,
}

impl HostConfig {
    /// Load from the default file location and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` (optional) and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: HostConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.timeout_secs == 0 {
            return Err(HostError::ConfigError("Session timeout cannot be 0".to_string()));
        }
        if self.session.timeout_warning_secs >= self.session.timeout_secs {
            return Err(HostError::ConfigError(
                "Timeout warning must come before the timeout".to_string(),
            ));
        }
        if self.session.flush_interval_ms == 0 {
            return Err(HostError::ConfigError("Flush interval cannot be 0".to_string()));
        }
        if self.session.input_poll_interval_ms == 0 {
            return Err(HostError::ConfigError("Input poll interval cannot be 0".to_string()));
        }
        if self.session.entry_symbol.is_empty() {
            return Err(HostError::ConfigError("Entry symbol cannot be empty".to_string()));
        }

        self.quotas.validate().map_err(HostError::ConfigError)?;

        Ok(())
    }
}

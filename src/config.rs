//! Configuration module for the netscan scanner

use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-port timeout used by range scans
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Timeout for each liveness probe and for the echo fallback
pub const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 1000;

/// Timeout for reading a service banner
pub const DEFAULT_BANNER_TIMEOUT_MS: u64 = 3000;

/// Name of the per-user configuration file in the home directory
pub const CONFIG_FILE_NAME: &str = ".netscan.toml";

/// Main configuration structure for scanning operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Timeout for each connection attempt in milliseconds
    pub timeout: u64,

    /// Timeout for each liveness probe in milliseconds
    pub liveness_timeout: u64,

    /// Scan even if the host does not look alive
    pub skip_liveness: bool,

    /// Grab banners from open ports and match them against known signatures
    pub service_detection: bool,

    /// Timeout for banner grabbing in milliseconds
    pub banner_timeout: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: crate::scanner::DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT_MS,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT_MS,
            skip_liveness: false,
            service_detection: false,
            banner_timeout: DEFAULT_BANNER_TIMEOUT_MS,
        }
    }
}

impl ScanConfig {
    /// Default configuration with the process-wide worker count at this moment
    pub fn current() -> Self {
        Self {
            concurrency: crate::scanner::concurrency(),
            ..Default::default()
        }
    }

    /// Set the number of workers. Zero keeps the previous value.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        if concurrency > 0 {
            self.concurrency = concurrency;
        } else {
            log::debug!(
                "Ignoring worker count of 0, keeping {}",
                self.concurrency
            );
        }
        self
    }

    /// Set the per-port timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = whole_millis(timeout);
        self
    }

    /// Set the liveness probe timeout
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = whole_millis(timeout);
        self
    }

    pub fn with_skip_liveness(mut self, skip: bool) -> Self {
        self.skip_liveness = skip;
        self
    }

    pub fn with_service_detection(mut self, enabled: bool) -> Self {
        self.service_detection = enabled;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn liveness_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout)
    }

    pub fn banner_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.banner_timeout)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let mut config: ScanConfig = toml::from_str(content)
            .map_err(|e| ScanError::ConfigError(format!("Failed to parse TOML: {}", e)))?;

        if config.concurrency == 0 {
            let previous = crate::scanner::concurrency();
            log::warn!("Config sets concurrency to 0, keeping {}", previous);
            config.concurrency = previous;
        }

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML text
    pub fn to_toml_string(&self) -> crate::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ScanError::ConfigError(format!("Config serialization error: {}", e)))
    }

    /// Path of the per-user configuration file
    pub fn default_config_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(CONFIG_FILE_NAME)
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load_default_config() -> Self {
        let path = Self::default_config_path();

        if path.exists() {
            match Self::from_toml_file(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("Ignoring {}: {}", path.display(), e);
                }
            }
        }

        Self::current()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.concurrency == 0 {
            return Err(ScanError::ConfigError(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.concurrency > crate::scanner::MAX_CONCURRENCY {
            return Err(ScanError::ConfigError(format!(
                "Concurrency must be at most {}",
                crate::scanner::MAX_CONCURRENCY
            )));
        }

        if self.timeout == 0 {
            return Err(ScanError::ConfigError(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.liveness_timeout == 0 {
            return Err(ScanError::ConfigError(
                "Liveness timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Round up to whole milliseconds so a sub-millisecond timeout never becomes 0
fn whole_millis(duration: Duration) -> u64 {
    ((duration.as_micros() + 999) / 1000) as u64
}

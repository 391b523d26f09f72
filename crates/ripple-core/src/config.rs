use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for ripple
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RippleConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Propagation behaviour
    #[serde(default)]
    pub propagation: PropagationConfig,

    /// Association declaration file (TOML)
    #[serde(default)]
    pub declarations: Option<PathBuf>,

    /// Fixture dataset for the in-memory store (JSON)
    #[serde(default)]
    pub dataset: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact", "full"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Dispatch notifications from the lifecycle hook
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum entities expanded as sources in one run (None = unlimited)
    #[serde(default)]
    pub max_sources: Option<usize>,

    /// Capacity of the notification broadcast channel
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_sources: None,
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_broadcast_capacity() -> usize {
    256
}

/// Configuration loader
pub struct ConfigManager {
    config: RippleConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Config file (./.ripple.toml, then ~/.ripple/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let (config, config_path) = Self::find_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load from an explicit file; a missing file is an error.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: RippleConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match &config_path {
            Some(path) => info!(path = %path.display(), "configuration loaded"),
            None => info!("no config file found, using defaults"),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    fn find_config_file() -> Result<(RippleConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".ripple.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".ripple").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((RippleConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<RippleConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: RippleConfig) -> RippleConfig {
        // RUST_LOG goes straight to the subscriber's env filter
        if let Ok(level) = std::env::var("RIPPLE_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
        if let Ok(format) = std::env::var("RIPPLE_LOG_FORMAT") {
            config.logging.format = format;
        }

        if let Ok(enabled) = std::env::var("RIPPLE_PROPAGATION_ENABLED") {
            config.propagation.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }
        if let Ok(max) = std::env::var("RIPPLE_MAX_SOURCES") {
            match max.parse() {
                Ok(n) => config.propagation.max_sources = Some(n),
                Err(e) => warn!("Ignoring RIPPLE_MAX_SOURCES={}: {}", max, e),
            }
        }
        if let Ok(capacity) = std::env::var("RIPPLE_BROADCAST_CAPACITY") {
            match capacity.parse() {
                Ok(n) => config.propagation.broadcast_capacity = n,
                Err(e) => warn!("Ignoring RIPPLE_BROADCAST_CAPACITY={}: {}", capacity, e),
            }
        }

        if let Ok(path) = std::env::var("RIPPLE_DECLARATIONS") {
            config.declarations = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("RIPPLE_DATASET") {
            config.dataset = Some(PathBuf::from(path));
        }

        config
    }

    pub fn validate_config(config: &RippleConfig) -> Result<(), ConfigError> {
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            // env-filter directives such as `ripple_core=debug`
            directive if directive.contains('=') => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" | "full" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, full",
                    other
                )))
            }
        }

        if config.propagation.broadcast_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn config(&self) -> &RippleConfig {
        &self.config
    }

    pub fn into_config(self) -> RippleConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

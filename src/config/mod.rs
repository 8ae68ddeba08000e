//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;

pub use messaging::{AmqpConfig, MessagingConfig, MessagingType};

use std::time::Duration;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "STOCKSYNC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "STOCKSYNC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "STOCKSYNC_LOG";

/// Service identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Prefix for durable subscription queues.
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "inventory-service".to_string(),
        }
    }
}

/// Request/response timeouts for the order choreography, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub stock_check_ms: u64,
    pub stock_deduct_ms: u64,
    pub stock_release_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stock_check_ms: 5000,
            stock_deduct_ms: 5000,
            stock_release_ms: 5000,
        }
    }
}

impl TimeoutConfig {
    pub fn stock_check(&self) -> Duration {
        Duration::from_millis(self.stock_check_ms)
    }

    pub fn stock_deduct(&self) -> Duration {
        Duration::from_millis(self.stock_deduct_ms)
    }

    pub fn stock_release(&self) -> Duration {
        Duration::from_millis(self.stock_release_ms)
    }
}

/// Inventory service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Maximum number of generated product codes tried before giving up.
    pub product_code_attempts: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            product_code_attempts: 32,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messaging configuration.
    pub messaging: MessagingConfig,
    /// Service identity.
    pub service: ServiceConfig,
    /// Request timeouts.
    pub timeouts: TimeoutConfig,
    /// Inventory settings.
    pub inventory: InventoryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing: in-process broker, short timeouts.
    pub fn for_test() -> Self {
        Self {
            timeouts: TimeoutConfig {
                stock_check_ms: 1000,
                stock_deduct_ms: 1000,
                stock_release_ms: 1000,
            },
            ..Self::default()
        }
    }
}

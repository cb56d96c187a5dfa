//! Application configuration
//!
//! Layered with the `config` crate, later sources overriding earlier ones:
//! built-in defaults, an optional TOML file, then `PRICE_SYNC__*` environment
//! variables (`__` separates nested keys, e.g. `PRICE_SYNC__ENGINE__CONSUMERS=2`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::crawling::rate_controller::RateControllerConfig;
use crate::crawling::updater::UpdaterConfig;
use crate::domain::vendor_policy::{VendorPolicy, VendorPolicyTable};
use crate::infrastructure::http_client::HttpClientConfig;

/// Default configuration values
pub mod defaults {
    use crate::crawling;

    /// Bound on buffered tasks between producer and consumers
    pub const QUEUE_CAPACITY: usize = crawling::queues::DEFAULT_QUEUE_CAPACITY;

    /// Reschedules allowed before a task is exhausted
    pub const MAX_RETRIES: u32 = crawling::retry::DEFAULT_MAX_RETRIES;

    pub const MAX_IDLE_CYCLES: u32 = crawling::updater::DEFAULT_MAX_IDLE_CYCLES;

    /// Candidates selected per run
    pub const BULK_SIZE: usize = crawling::updater::DEFAULT_BULK_SIZE;

    pub const CONSUMERS: usize = 1;

    /// Stat Buffer sliding window
    pub const STAT_WINDOW_SECONDS: u64 = 20;

    /// Minimum time between rate rechecks
    pub const RECHECK_INTERVAL_SECONDS: u64 = 20;

    /// Window must hold more samples than this before a recheck
    pub const MIN_SAMPLES: usize = 10;

    pub const RATE_DECREASE_FACTOR: f64 = 1.05;

    pub const RATE_INCREASE_STEP: f64 = 0.05;

    /// Request rate floor
    pub const MIN_RATE: f64 = 0.05;

    /// Blocking worker slots for synchronous vendor clients
    pub const BLOCKING_WORKERS: usize = 4;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const DATABASE_URL: &str = "sqlite://data/price_sync.db";

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_FILE_NAME: &str = "price_sync.log";

    /// Prefix for environment overrides
    pub const ENV_PREFIX: &str = "PRICE_SYNC";
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Engine tuning shared by every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub max_idle_cycles: u32,
    pub consumers: usize,
    pub bulk_size: usize,
    pub stat_window_seconds: u64,
    pub recheck_interval_seconds: u64,
    pub min_samples: usize,
    pub rate_decrease_factor: f64,
    pub rate_increase_step: f64,
    pub min_rate: f64,
    pub max_rate: Option<f64>,
    pub blocking_workers: usize,
    /// Watchdog for a whole run; none by default
    pub run_timeout_seconds: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::QUEUE_CAPACITY,
            max_retries: defaults::MAX_RETRIES,
            max_idle_cycles: defaults::MAX_IDLE_CYCLES,
            consumers: defaults::CONSUMERS,
            bulk_size: defaults::BULK_SIZE,
            stat_window_seconds: defaults::STAT_WINDOW_SECONDS,
            recheck_interval_seconds: defaults::RECHECK_INTERVAL_SECONDS,
            min_samples: defaults::MIN_SAMPLES,
            rate_decrease_factor: defaults::RATE_DECREASE_FACTOR,
            rate_increase_step: defaults::RATE_INCREASE_STEP,
            min_rate: defaults::MIN_RATE,
            max_rate: None,
            blocking_workers: defaults::BLOCKING_WORKERS,
            run_timeout_seconds: None,
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn rate_controller_config(&self) -> RateControllerConfig {
        RateControllerConfig {
            min_samples: self.min_samples,
            recheck_interval: Duration::from_secs(self.recheck_interval_seconds),
            decrease_factor: self.rate_decrease_factor,
            increase_step: self.rate_increase_step,
            min_rate: self.min_rate,
            max_rate: self.max_rate,
        }
    }

    #[must_use]
    pub fn updater_config(&self) -> UpdaterConfig {
        UpdaterConfig {
            queue_capacity: self.queue_capacity,
            max_retries: self.max_retries,
            max_idle_cycles: self.max_idle_cycles,
            consumers: self.consumers,
            bulk_size: self.bulk_size,
            stat_window: Duration::from_secs(self.stat_window_seconds),
            rate: self.rate_controller_config(),
            run_timeout: self.run_timeout_seconds.map(Duration::from_secs),
        }
    }

    /// Worker pool shared by every `BlockingAdapter` built from this config
    #[must_use]
    pub fn blocking_pool(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.blocking_workers.max(1)))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for log files; `./logs` when unset
    pub log_dir: Option<PathBuf>,

    pub file_name: String,

    /// Module-specific level overrides, e.g. `"sqlx" = "warn"`
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: HashMap::new(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub logging: LoggingConfig,
    pub http: HttpClientConfig,
    pub policies: VendorPolicyTable,
    pub database_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            logging: LoggingConfig::default(),
            http: HttpClientConfig::default(),
            policies: VendorPolicyTable::builtin(),
            database_url: defaults::DATABASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Loads defaults, the optional file at `path` and process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`AppConfig::load`], reading overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document layered over the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolved policy for a vendor slug
    #[must_use]
    pub fn policy_for(&self, vendor: &str) -> VendorPolicy {
        self.policies.policy_for(vendor)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Validation { message };

        self.engine
            .updater_config()
            .validate()
            .map_err(|e| invalid(e.to_string()))?;
        if self.engine.blocking_workers == 0 {
            return Err(invalid("engine.blocking_workers must be at least 1".to_string()));
        }
        self.policies.validate().map_err(invalid)?;
        self.http.validate().map_err(invalid)?;
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url must not be empty".to_string()));
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(invalid(format!("unknown log level '{}'", self.logging.level)));
        }
        Ok(())
    }
}

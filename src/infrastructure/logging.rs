//! Logging system configuration and initialization
//!
//! - console and/or file output, plain text or JSON
//! - level from configuration, overridable with `RUST_LOG`
//! - dependency noise (`sqlx`, `reqwest`, `hyper`) suppressed below TRACE

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use lazy_static::lazy_static;
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Verbose targets held back unless TRACE is requested
const QUIET_DEPENDENCIES: &[&str] = &[
    "sqlx::query=warn",
    "sqlx=warn",
    "reqwest=info",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "tokio=info",
];

/// `./logs` under the working directory
#[must_use]
pub fn default_log_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_default().join("logs")
}

/// Builds the filter from configuration alone, ignoring `RUST_LOG`
pub fn filter_from_config(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    if !config.level.eq_ignore_ascii_case("trace") {
        for directive in QUIET_DEPENDENCIES {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    for (module, level) in &config.module_filters {
        let directive = format!("{module}={level}");
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("Invalid module filter: {directive}"))?,
        );
    }
    Ok(filter)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level when set, e.g.
/// `RUST_LOG="debug,sqlx::query=debug"`.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from_config(config)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.file_output {
        let log_dir = config.log_dir.clone().unwrap_or_else(default_log_directory);
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let (file_writer, guard) = non_blocking(rolling::never(&log_dir, &config.file_name));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("log guard registry poisoned"))?
            .push(guard);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(file_writer)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        let console_layer = if config.json_format {
            fmt::layer().json().with_writer(std::io::stdout).boxed()
        } else {
            fmt::layer().with_writer(std::io::stdout).with_target(false).boxed()
        };
        layers.push(console_layer);
    }

    if layers.is_empty() {
        bail!("No logging output configured");
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Global tracing subscriber already installed")?;

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        "Logging system initialized"
    );
    Ok(())
}

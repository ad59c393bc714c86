//! Structured logging setup.
//!
//! Everything is configured from `SMARTHTTP_LOG_*` environment variables:
//!
//! | Variable                 | Default | Meaning                                  |
//! |--------------------------|---------|------------------------------------------|
//! | `SMARTHTTP_LOG_LEVEL`    | `info`  | trace/debug/info/warn/error              |
//! | `SMARTHTTP_LOG_FORMAT`   | `json`  | `json` or `pretty`                       |
//! | `SMARTHTTP_LOG_ASYNC`    | `true`  | write through a non-blocking appender    |
//! | `SMARTHTTP_LOG_FILTER`   | unset   | extra comma-separated filter directives  |
//! | `SMARTHTTP_LOG_LOCATION` | `false` | include file and line                    |
//!
//! `RUST_LOG`, when set, replaces the level.

use std::env;

use anyhow::{Context, Result};
use tracing::{warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    pub async_logging: bool,
    /// Extra filter directives, comma-separated
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl LogConfig {
    /// Read the configuration from the environment, with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|value| value.parse().ok())
                .unwrap_or(default)
        };
        Self {
            log_level: lookup("SMARTHTTP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: LogFormat::parse(
                &lookup("SMARTHTTP_LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
            ),
            async_logging: flag("SMARTHTTP_LOG_ASYNC", true),
            target_filter: lookup("SMARTHTTP_LOG_FILTER"),
            include_location: flag("SMARTHTTP_LOG_LOCATION", false),
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<()> {
    let level = parse_level(&config.log_level);
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let mut rejected = Vec::new();
    if let Some(target_filter) = &config.target_filter {
        for filter in target_filter.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match filter.parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(_) => rejected.push(filter.to_string()),
            }
        }
    }

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(non_blocking)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(non_blocking)
                .boxed(),
        };
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize async logging")?;
        // The writer thread must outlive every log call.
        std::mem::forget(guard);
    } else {
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
        };
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize sync logging")?;
    }

    for filter in rejected {
        warn!(directive = %filter, "Ignoring invalid log filter directive");
    }
    Ok(())
}

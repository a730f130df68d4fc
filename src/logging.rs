//! Logging setup for binaries and tests driving the data plane.
//!
//! The library only emits `tracing` events; nothing is printed until a
//! subscriber is installed with [`init_logging`].

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`.
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "compact" => Self::Compact,
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: Level::INFO, format: LogFormat::Pretty }
    }
}

impl LogConfig {
    pub fn new(level: &str, format: &str) -> Self {
        Self { level: parse_level(level), format: LogFormat::parse(format) }
    }

    /// `RUST_LOG` wins over the configured level.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Installs the global subscriber. Returns false if one was already set.
pub fn init_logging(config: &LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let res = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };
    res.is_ok()
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

//! Tracing setup for the simulator binary.
//!
//! Structured, async-aware logging built on `tracing-subscriber`:
//! - pretty, compact or JSON output
//! - `RUST_LOG` overrides the configured level
//! - span open/close events so dispatcher and sink tasks can be followed
//!
//! # Example
//! ```no_run
//! use explore_daq::{config::SimulatorConfig, logging};
//!
//! let config = SimulatorConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Simulator started");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use daq_core::{AppResult, DaqError};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::SimulatorConfig;

/// Output format for tracing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    #[default]
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format for log aggregation
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include span events (NEW, CLOSE)
    pub with_span_events: bool,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to include thread names
    pub with_thread_names: bool,
    /// Whether to enable ANSI colors (Pretty only)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: true,
            with_file_and_line: true,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Tracing config from the simulator configuration
    pub fn from_config(config: &SimulatorConfig) -> AppResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
            ..Default::default()
        })
    }

    /// Tracing config at `level` with default options
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from the simulator configuration
pub fn init_from_config(config: &SimulatorConfig) -> AppResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Initialize tracing with custom configuration
///
/// Idempotent: if a global subscriber is already installed this returns
/// `Ok(())`, so tests and embedding applications may call it freely.
pub fn init(config: TracingConfig) -> AppResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_thread_names(config.with_thread_names);

    let fmt_layer = match config.format {
        OutputFormat::Pretty => base.pretty().with_ansi(config.with_ansi).boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
        OutputFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .or_else(|e| {
            if e.to_string().contains("a global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(DaqError::Configuration(format!("Failed to initialize tracing: {e}")))
            }
        })
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(DaqError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));

        // Case insensitive
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("Debug"), Ok(Level::DEBUG)));

        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_tracing_config_builder() {
        let config = TracingConfig::new(Level::WARN)
            .with_format(OutputFormat::Json)
            .with_span_events(false)
            .with_ansi(false);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(!config.with_span_events);
        assert!(!config.with_ansi);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = TracingConfig::new(Level::ERROR).with_format(OutputFormat::Compact);
        assert!(init(config.clone()).is_ok());
        assert!(init(config).is_ok());
    }
}

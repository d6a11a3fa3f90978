//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is up to the
//! binary (or a test). [`init`] is idempotent so several entry points may call it.
//!
//! # Example
//! ```no_run
//! use chantrig::config::ChanTrigConfig;
//! use chantrig::logging;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChanTrigConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(frames = 300, "Exchange running");
//! # Ok(())
//! # }
//! ```

use crate::config::ChanTrigConfig;
use crate::error::{AppResult, ChanTrigError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Multi-line, colored (development).
    #[default]
    Pretty,
    /// Single line, no colors.
    Compact,
    /// One JSON object per event (log aggregation).
    Json,
}

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is not set.
    pub level: Level,
    /// Output format.
    pub format: OutputFormat,
    /// Emit span NEW/CLOSE events.
    pub with_span_events: bool,
    /// Include file and line numbers.
    pub with_file_and_line: bool,
    /// Include thread names (the firmware thread is named).
    pub with_thread_names: bool,
    /// ANSI colors (pretty format only).
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: false,
            with_file_and_line: false,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Options at `level` with defaults otherwise.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Options derived from the loaded configuration.
    pub fn from_config(config: &ChanTrigConfig) -> AppResult<Self> {
        Ok(Self::new(parse_log_level(&config.log_level)?))
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Install a subscriber using the configured log level.
pub fn init_from_config(config: &ChanTrigConfig) -> AppResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Install a subscriber. Returns `Ok(())` if one is already installed.
pub fn init(config: TracingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));
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

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        OutputFormat::Pretty => base.pretty().with_ansi(config.with_ansi).boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
        OutputFormat::Json => base.json().with_ansi(false).boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init();
    tolerate_existing(installed)
}

fn tolerate_existing<E: std::fmt::Display>(result: Result<(), E>) -> AppResult<()> {
    match result {
        Ok(()) => Ok(()),
        // Tests and embedding hosts commonly install their own subscriber first.
        Err(e) if e.to_string().contains("already") => Ok(()),
        Err(e) => Err(ChanTrigError::Logging(format!(
            "failed to initialize tracing: {e}"
        ))),
    }
}

/// Parse a case-insensitive log level name.
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    level.parse::<Level>().map_err(|_| {
        ChanTrigError::ConfigurationRejected(format!(
            "invalid log level '{level}', expected one of trace, debug, info, warn, error"
        ))
    })
}

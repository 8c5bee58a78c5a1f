//! Structured logging setup for Tally
//!
//! Builds a `tracing-subscriber` registry from a [`LogConfig`]:
//!
//! - **Console**: JSON lines (default) or pretty human-readable output
//! - **File**: JSON lines via `tracing-appender`, daily/hourly/never rotation
//! - **Filtering**: `RUST_LOG` wins over the configured default level
//!
//! # Quick Start
//!
//! ```ignore
//! use tally_logging::{LogConfig, TallySubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = TallySubscriberBuilder::new().init()?;
//!
//! // Pretty console plus daily JSONL files
//! let mut config = LogConfig::default();
//! config.use_pretty_console();
//! config.log_to_dir("/var/log/tally");
//! let _guard = TallySubscriberBuilder::new().with_config(config).init()?;
//! ```
//!
//! Keep the returned guard alive for as long as file output should flush.

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use thiserror::Error;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory or file appender could not be set up
    #[error("Failed to set up log file: {0}")]
    File(String),

    /// A global subscriber is already installed
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and initializing the Tally logging subscriber
pub struct TallySubscriberBuilder {
    config: LogConfig,
}

impl TallySubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    ///
    /// Default: JSONL output to console
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Switch the console between pretty and JSONL output
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration this builder will install
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer guard when file output is enabled.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(json_layer(&self.config.jsonl, writer));
            guard = Some(file_guard);
        }

        Registry::default()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(
            level = %self.config.default_level,
            file = self.config.file.is_some(),
            "Logging initialized"
        );
        Ok(guard)
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            tracing_subscriber::fmt::layer()
                .with_ansi(self.config.console.ansi)
                .with_target(true)
                .boxed()
        } else {
            json_layer(&self.config.jsonl, std::io::stdout)
        }
    }
}

impl Default for TallySubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a non-blocking rolling file writer
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(&config.directory).map_err(|e| LoggingError::File(e.to_string()))?;

    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => Rotation::NEVER,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.clone())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }

    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::File(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSON-lines layer shaped by `jsonl`, writing to `writer`
fn json_layer<W>(jsonl: &JsonlConfig, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(jsonl.include_spans)
        .flatten_event(jsonl.flatten_events)
        .with_file(jsonl.include_location)
        .with_line_number(jsonl.include_location)
        .with_writer(writer)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder_creation() {
        let builder = TallySubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
    }

    #[test]
    fn test_default_is_jsonl() {
        let builder = TallySubscriberBuilder::new();
        assert!(!builder.config().console.pretty); // JSONL by default
    }

    #[test]
    fn test_builder_overrides() {
        let mut config = LogConfig::default();
        config.use_pretty_console();
        let builder = TallySubscriberBuilder::new()
            .with_config(config)
            .with_level("trace")
            .with_pretty(false)
            .with_console(false);
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.pretty);
        assert!(!builder.config().console.enabled);
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let temp = TempDir::new().unwrap();
        let config = FileConfig {
            directory: temp.path().join("logs"),
            rotation: RotationStrategy::Never,
            ..Default::default()
        };

        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(config.directory.is_dir());
    }
}

//! Logging Configuration and Initialization
//!
//! Every record is written to three destinations:
//!
//! - the console (stdout)
//! - `error.log`, which only receives `ERROR` records
//! - `combined.log`, which receives every record that passes the filter
//!
//! Two profiles are selected by [`ExecutionMode`]:
//!
//! - **development**: human-readable, colorized, timestamped lines, minimum
//!   level `debug`
//! - **production**: JSON lines, minimum level `info`
//!
//! File writers are non-blocking: a slow or failing disk drops records
//! instead of stalling request handling. When the log directory cannot be
//! prepared the subscriber is still built with the console layer alone and
//! the failure is reported through [`LogGuard::file_sink_error`].
//!
//! # Best Practices
//!
//! 1. **NEVER use `println!`, `eprintln!`, or `dbg!` macros**
//!    - Use structured logging macros instead: `trace!`, `debug!`, `info!`, `warn!`, `error!`
//!
//! 2. **Use structured logging with fields**:
//!    ```rust
//!    use tracing::{info, error};
//!
//!    # let client = "10.0.0.1"; let err = "boom";
//!    info!(client = %client, "Request accepted");
//!    error!(error = ?err, "Handler failed");
//!    ```
//!
//! # Example
//!
//! ```no_run
//! use keel_common::logging::{init_logging, LogConfig};
//! use keel_common::ExecutionMode;
//!
//! let config = LogConfig::from_env_over(LogConfig::for_mode(ExecutionMode::Development)).unwrap();
//! let _guard = init_logging(&config).unwrap();
//! tracing::info!("Application started");
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{level_filters::LevelFilter, Dispatch, Level};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt, layer::Layered, layer::SubscriberExt, EnvFilter, Layer, Registry,
};

use crate::error::{LogError, Result};
use crate::mode::ExecutionMode;

/// File receiving `ERROR` records only
pub const ERROR_LOG_NAME: &str = "error";

/// File receiving every record
pub const COMBINED_LOG_NAME: &str = "combined";

const LOG_FILE_SUFFIX: &str = "log";

type LoggingSubscriber = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<LoggingSubscriber> + Send + Sync>;

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very detailed trace-level logging
    Trace,
    /// Debug-level logging for development
    Debug,
    /// Informational messages
    #[default]
    Info,
    /// Warning messages
    Warn,
    /// Error messages
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LogError::invalid("log level", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::invalid("log format", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// How often the log files roll over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// A single `error.log` / `combined.log` pair
    #[default]
    Never,
    Hourly,
    Daily,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

impl std::str::FromStr for LogRotation {
    type Err = LogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" | "none" => Ok(LogRotation::Never),
            "hourly" => Ok(LogRotation::Hourly),
            "daily" => Ok(LogRotation::Daily),
            _ => Err(LogError::invalid("log rotation", s)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level, unless `RUST_LOG` says otherwise
    pub level: LogLevel,

    /// Log format for every destination
    pub format: LogFormat,

    /// Colorize console output (never applied to files)
    pub ansi: bool,

    /// Directory holding `error.log` and `combined.log`
    pub log_dir: PathBuf,

    /// File rotation policy
    pub rotation: LogRotation,

    /// Additional filter directives (e.g., "tower_http=debug,hyper=info")
    pub filter_directives: Option<String>,

    /// Whether to include target module names in logs
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_mode(ExecutionMode::Development)
    }
}

impl LogConfig {
    /// Profile for the given execution mode.
    ///
    /// Test runs use the development format at `warn` so suites stay quiet.
    pub fn for_mode(mode: ExecutionMode) -> Self {
        let (level, format, ansi) = match mode {
            ExecutionMode::Development => (LogLevel::Debug, LogFormat::Text, true),
            ExecutionMode::Production => (LogLevel::Info, LogFormat::Json, false),
            ExecutionMode::Test => (LogLevel::Warn, LogFormat::Text, false),
        };

        Self {
            level,
            format,
            ansi,
            log_dir: PathBuf::from("logs"),
            rotation: LogRotation::Never,
            filter_directives: None,
            include_targets: true,
        }
    }

    /// Apply environment overrides on top of `base`
    ///
    /// Environment variables:
    /// - `LOG_LEVEL`: Log level (trace, debug, info, warn, error)
    /// - `LOG_FORMAT`: Log format (text, json)
    /// - `LOG_DIR`: Directory for log files
    /// - `LOG_ROTATION`: File rotation (never, hourly, daily)
    /// - `LOG_FILTER`: Additional filter directives
    /// - `LOG_INCLUDE_TARGETS`: Include module targets (true/false)
    pub fn from_env_over(base: LogConfig) -> Result<Self> {
        Self::from_lookup_over(base, |key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup` on top of `base`
    pub fn from_lookup_over<F>(base: LogConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = base;

        if let Some(level) = lookup("LOG_LEVEL") {
            config.level = level.parse()?;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.format = format.parse()?;
            if config.format == LogFormat::Json {
                config.ansi = false;
            }
        }

        if let Some(dir) = lookup("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Some(rotation) = lookup("LOG_ROTATION") {
            config.rotation = rotation.parse()?;
        }

        if let Some(filter) = lookup("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }

        if let Some(val) = lookup("LOG_INCLUDE_TARGETS") {
            config.include_targets = val
                .trim()
                .parse()
                .map_err(|_| LogError::invalid("include targets flag", val))?;
        }

        Ok(config)
    }

    /// Create a builder for fluent configuration
    pub fn builder(mode: ExecutionMode) -> LogConfigBuilder {
        LogConfigBuilder {
            config: Self::for_mode(mode),
        }
    }
}

/// Builder for LogConfig
#[derive(Debug)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn ansi(mut self, ansi: bool) -> Self {
        self.config.ansi = ansi;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn filter_directives(mut self, filter: impl Into<String>) -> Self {
        self.config.filter_directives = Some(filter.into());
        self
    }

    pub fn include_targets(mut self, include: bool) -> Self {
        self.config.include_targets = include;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Keeps the background file writers alive.
///
/// Dropping the guard flushes and stops the writers, so hold it for the
/// lifetime of the process.
#[must_use = "dropping the guard stops the file log writers"]
pub struct LogGuard {
    workers: Vec<WorkerGuard>,
    file_sink_error: Option<String>,
}

impl LogGuard {
    /// Whether `error.log` and `combined.log` are being written
    pub fn file_sinks_active(&self) -> bool {
        self.file_sink_error.is_none()
    }

    /// Why the file sinks could not be opened, if they could not
    pub fn file_sink_error(&self) -> Option<&str> {
        self.file_sink_error.as_deref()
    }
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("workers", &self.workers.len())
            .field("file_sink_error", &self.file_sink_error)
            .finish()
    }
}

struct FileSinks {
    errors: NonBlocking,
    combined: NonBlocking,
    guards: Vec<WorkerGuard>,
}

/// Build the subscriber without installing it.
///
/// Tests use this with `tracing::dispatcher::with_default` to capture
/// records; the server installs it globally through [`init_logging`].
pub fn build_dispatch(config: &LogConfig) -> Result<(Dispatch, LogGuard)> {
    let filter = build_filter(config)?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];

    let (workers, file_sink_error) = match open_file_sinks(config) {
        Ok(sinks) => {
            layers.push(file_layer(config, sinks.errors, LevelFilter::ERROR));
            layers.push(file_layer(config, sinks.combined, LevelFilter::TRACE));
            (sinks.guards, None)
        },
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(layers);

    Ok((
        Dispatch::new(subscriber),
        LogGuard {
            workers,
            file_sink_error,
        },
    ))
}

/// Initialize logging with the given configuration
///
/// This installs the global subscriber. It should only be called once at
/// application startup; a second call fails with
/// [`LogError::AlreadyInstalled`].
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let (dispatch, guard) = build_dispatch(config)?;
    tracing::dispatcher::set_global_default(dispatch)?;

    if let Some(reason) = guard.file_sink_error() {
        tracing::warn!(
            log_dir = %config.log_dir.display(),
            error = %reason,
            "File log sinks unavailable, logging to console only"
        );
    }

    Ok(guard)
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let level = LevelFilter::from_level(config.level.to_tracing_level());
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    Ok(filter)
}

fn console_layer(config: &LogConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(config.include_targets);

    match config.format {
        LogFormat::Text => layer.with_ansi(config.ansi).boxed(),
        LogFormat::Json => layer.json().with_ansi(false).boxed(),
    }
}

fn file_layer(config: &LogConfig, writer: NonBlocking, max_level: LevelFilter) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(config.include_targets)
        .with_ansi(false); // No ANSI colors in files

    match config.format {
        LogFormat::Text => layer.with_filter(max_level).boxed(),
        LogFormat::Json => layer.json().with_filter(max_level).boxed(),
    }
}

fn open_file_sinks(config: &LogConfig) -> Result<FileSinks> {
    std::fs::create_dir_all(&config.log_dir)?;

    let (errors, errors_guard) = tracing_appender::non_blocking(file_appender(config, ERROR_LOG_NAME)?);
    let (combined, combined_guard) =
        tracing_appender::non_blocking(file_appender(config, COMBINED_LOG_NAME)?);

    Ok(FileSinks {
        errors,
        combined,
        guards: vec![errors_guard, combined_guard],
    })
}

fn file_appender(config: &LogConfig, name: &str) -> Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(config.rotation.into())
        .filename_prefix(name)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(&config.log_dir)?)
}

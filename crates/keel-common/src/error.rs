//! Error types for Keel common utilities

use thiserror::Error;

/// Result type alias for logging setup
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors raised while configuring or installing the logging subsystem
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Invalid {field} value: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Invalid filter directive: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("A global logger is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

impl LogError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        LogError::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

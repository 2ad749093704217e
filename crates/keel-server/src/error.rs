//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;

/// Message shown to clients for every unclassified failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Result type alias for handlers and stages
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input or a policy violation (bad body, rate limit)
    #[error("{message}")]
    Validation { status: StatusCode, message: String },

    /// Raised on purpose by handler logic; passed through verbatim
    #[error("{message}")]
    Application { status: StatusCode, message: String },

    /// Anything unexpected; detail is logged, never sent to the client
    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),

    /// Fatal configuration problem; the process must not serve traffic
    #[error("Startup configuration error: {0}")]
    Startup(String),
}

impl AppError {
    /// Application error with the default 500 classification
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Application {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::validation(StatusCode::BAD_REQUEST, message)
    }

    pub fn validation(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Validation {
            status,
            message: message.into(),
        }
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::validation(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal(error: impl Into<anyhow::Error>) -> Self {
        AppError::Internal(error.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { status, .. } | AppError::Application { status, .. } => *status,
            AppError::Internal(_) | AppError::Startup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message may be shown to the client as is
    pub fn is_classified(&self) -> bool {
        matches!(self, AppError::Validation { .. } | AppError::Application { .. })
    }

    /// Wording the client sees
    pub fn client_message(&self) -> &str {
        match self {
            AppError::Validation { message, .. } | AppError::Application { message, .. } => {
                message
            },
            AppError::Internal(_) | AppError::Startup(_) => INTERNAL_ERROR_MESSAGE,
        }
    }
}

/// Marker attached to a response produced from an [`AppError`].
///
/// Stages and handlers only set the status; the error boundary is the one
/// place that turns the marker into the JSON body the client sees.
#[derive(Debug, Clone)]
pub struct ErrorReport(pub Arc<AppError>);

impl ErrorReport {
    pub fn error(&self) -> &AppError {
        &self.0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(ErrorReport(Arc::new(self)));
        response
    }
}

//! API response types
//!
//! Bodies shared by the built-in endpoints and the error boundary.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Value of `status` in every error body.
pub const ERROR_STATUS: &str = "error";

/// Uniform error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `"error"`
    #[schema(example = "error")]
    pub status: String,
    #[schema(example = "Route not found")]
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ERROR_STATUS.to_string(),
            message: message.into(),
        }
    }
}

/// Liveness probe body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Welcome body served at the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WelcomeResponse {
    #[schema(example = "Welcome to the API")]
    pub message: String,
}

impl WelcomeResponse {
    pub fn new() -> Self {
        Self {
            message: "Welcome to the API".to_string(),
        }
    }
}

impl Default for WelcomeResponse {
    fn default() -> Self {
        Self::new()
    }
}

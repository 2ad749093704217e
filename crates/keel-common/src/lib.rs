//! Keel Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and the logging subsystem for the Keel workspace.
//!
//! # Overview
//!
//! - **Execution mode**: the `development` / `production` / `test` switch
//!   every other component keys its behaviour on
//! - **Logging**: console plus errors-only and combined log files, with a
//!   human-readable development profile and a JSON production profile
//! - **Errors**: typed errors raised while setting up logging
//!
//! # Example
//!
//! ```no_run
//! use keel_common::{logging::{init_logging, LogConfig}, ExecutionMode};
//!
//! fn main() -> Result<(), keel_common::LogError> {
//!     let config = LogConfig::for_mode(ExecutionMode::Production);
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod mode;

// Re-export commonly used types
pub use error::{LogError, Result};
pub use mode::ExecutionMode;

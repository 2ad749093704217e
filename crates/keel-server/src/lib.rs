//! Keel Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP API starter built around a fixed request-processing pipeline.
//!
//! # Overview
//!
//! Every request passes through the same ordered stages before it reaches a
//! handler:
//!
//! - **Security headers**: defensive response headers on every answer
//! - **CORS**: origin policy from configuration, preflights answered early
//! - **Parameter-pollution guard**: repeated query keys collapse to one value
//! - **Rate limiter**: 100 requests per client per 15 minutes by default
//! - **Body decoder**: JSON and URL-encoded forms, size-limited
//! - **Compression** and **access logging**
//! - **Routing**: documentation, the route table under `/api/v1`, `/health`
//!   and `/`, then a uniform 404
//!
//! Failures anywhere in the chain are rendered by the error boundary as
//! `{"status": "error", "message": ...}`.
//!
//! # Example
//!
//! ```no_run
//! use keel_server::{
//!     api::{build_server, AppServices},
//!     config::Config,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let services = AppServices::from_config(&config)?;
//!     let server = build_server(&config, services);
//!
//!     let listener = tokio::net::TcpListener::bind(server.address()).await?;
//!     server.serve(listener).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;

pub use error::{AppError, AppResult};

//! Keel Server - Main entry point

use anyhow::{Context, Result};
use keel_common::logging::{init_logging, LogConfig};
use tracing::info;

use keel_server::{
    api::{build_server, AppServices},
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first: the execution mode picks the log profile
    let config = Config::load().context("Failed to load configuration")?;

    let log_config = LogConfig::builder(config.mode)
        .log_dir(&config.log_dir)
        .build();

    // Environment overrides take precedence
    let log_config = LogConfig::from_env_over(log_config)?;
    let _log_guard = init_logging(&log_config)?;

    info!(mode = %config.mode, "Starting Keel Server");

    if config.database.url.is_none() {
        info!("DATABASE_URL not set, persistence layer disabled");
    }

    let services = AppServices::from_config(&config)?;
    let server = build_server(&config, services);

    let listener = tokio::net::TcpListener::bind(server.address())
        .await
        .with_context(|| format!("Failed to bind {}", server.address()))?;

    server.serve(listener).await
}

//! Configuration management
//!
//! Settings are resolved once at startup from the process environment (and an
//! optional `.env` file), validated, and then shared read-only. Any malformed
//! or out-of-range value aborts startup with [`AppError::Startup`].

use keel_common::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default CORS allowed origin (any).
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

/// Requests allowed per client within one window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// Rate-limit window length in seconds (15 minutes).
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// Maximum decoded request body size in bytes (100 KiB).
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 100 * 1024;

/// Default directory for `error.log` and `combined.log`.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Keys read as comma-separated lists.
const LIST_KEYS: [&str; 2] = ["cors_origins", "hpp_whitelist"];

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: ExecutionMode,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub body: BodyConfig,
    pub parameter_pollution: ParameterPollutionConfig,
    pub log_dir: PathBuf,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Connection settings handed to the persistence layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Identify clients by the left-most `X-Forwarded-For` entry instead of
    /// the peer address. Only enable behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            trust_proxy: false,
        }
    }
}

/// Body decoder configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BodyConfig {
    pub limit_bytes: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

/// Parameter-pollution guard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterPollutionConfig {
    /// Query keys allowed to repeat
    pub whitelist: Vec<String>,
}

/// Flat view of the environment, one field per variable.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    #[serde(default)]
    node_env: ExecutionMode,
    /// Prefixed so the shell's own `HOST` (often the machine name) is ignored
    #[serde(default = "default_host", deserialize_with = "deserialize_host")]
    keel_host: IpAddr,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_shutdown_timeout")]
    shutdown_timeout_secs: u64,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default = "default_cors_origins")]
    cors_origins: Vec<String>,
    #[serde(default)]
    cors_allow_credentials: bool,
    #[serde(default = "default_rate_limit_max")]
    rate_limit_max: u32,
    #[serde(default = "default_rate_limit_window")]
    rate_limit_window_secs: u64,
    #[serde(default)]
    trust_proxy: bool,
    #[serde(default = "default_body_limit")]
    body_limit_bytes: usize,
    #[serde(default)]
    hpp_whitelist: Vec<String>,
    #[serde(default = "default_log_dir")]
    log_dir: PathBuf,
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

/// An IP address, or `localhost` for the IPv4 loopback
fn deserialize_host<'de, D>(deserializer: D) -> Result<IpAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let host = raw.trim();
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::from([127, 0, 0, 1]));
    }
    host.parse().map_err(|_| {
        serde::de::Error::custom(format!(
            "KEEL_HOST must be an IP address or `localhost`, got `{host}`"
        ))
    })
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

fn default_cors_origins() -> Vec<String> {
    vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()]
}

fn default_rate_limit_max() -> u32 {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

fn default_rate_limit_window() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

impl From<EnvSettings> for Config {
    fn from(env: EnvSettings) -> Self {
        Config {
            mode: env.node_env,
            server: ServerConfig {
                host: env.keel_host,
                port: env.port,
                shutdown_timeout_secs: env.shutdown_timeout_secs,
            },
            database: DatabaseConfig {
                url: env.database_url.filter(|url| !url.is_empty()),
            },
            cors: CorsConfig {
                allowed_origins: clean_list(env.cors_origins),
                allow_credentials: env.cors_allow_credentials,
            },
            rate_limit: RateLimitConfig {
                max_requests: env.rate_limit_max,
                window_secs: env.rate_limit_window_secs,
                trust_proxy: env.trust_proxy,
            },
            body: BodyConfig {
                limit_bytes: env.body_limit_bytes,
            },
            parameter_pollution: ParameterPollutionConfig {
                whitelist: clean_list(env.hpp_whitelist),
            },
            log_dir: env.log_dir,
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the process environment and defaults
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_source(None)
    }

    /// Load configuration from an explicit variable map instead of the
    /// process environment. Keys use the environment spelling (`PORT`).
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, AppError> {
        Self::from_source(Some(vars.into_iter().collect()))
    }

    fn from_source(source: Option<config::Map<String, String>>) -> Result<Self, AppError> {
        let environment = LIST_KEYS.iter().fold(
            config::Environment::default()
                .source(source)
                .ignore_empty(true)
                .try_parsing(true)
                .list_separator(","),
            |env, key| env.with_list_parse_key(key),
        );

        let settings: EnvSettings = config::Config::builder()
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Startup(format!("Invalid environment: {e}")))?;

        let config = Config::from(settings);
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.port == 0 {
            return Err(AppError::Startup("PORT must be greater than 0".to_string()));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(AppError::Startup(
                "RATE_LIMIT_MAX must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(AppError::Startup(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string(),
            ));
        }

        if self.body.limit_bytes == 0 {
            return Err(AppError::Startup(
                "BODY_LIMIT_BYTES must be greater than 0".to_string(),
            ));
        }

        if self.cors.allow_credentials && self.cors.allows_any_origin() {
            return Err(AppError::Startup(
                "CORS_ALLOW_CREDENTIALS cannot be combined with a wildcard origin".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            server: ServerConfig {
                host: default_host(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig::default(),
            cors: CorsConfig {
                allowed_origins: default_cors_origins(),
                allow_credentials: false,
            },
            rate_limit: RateLimitConfig::default(),
            body: BodyConfig::default(),
            parameter_pollution: ParameterPollutionConfig::default(),
            log_dir: default_log_dir(),
        }
    }
}

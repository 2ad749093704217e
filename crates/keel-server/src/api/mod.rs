//! Pipeline builder and server lifecycle

pub mod docs;
pub mod response;
pub mod routes;
pub mod system;

use axum::{middleware, routing::get, Router};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer};
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::{
    access_log_layer,
    body::decode_body,
    cors_layer,
    error_boundary::{panic_to_error, render_errors, route_not_found},
    parameter_pollution::{guard_parameters, ParameterPollutionGuard},
    rate_limit::{enforce, RateLimitState, RateLimiter},
    security_headers::security_headers,
};
use docs::ApiDocs;
use routes::RouteTable;

/// Every route table group is mounted below this path.
pub const API_PREFIX: &str = "/api/v1";

/// Long-lived services built once at startup and injected into the pipeline
pub struct AppServices {
    pub limiter: Arc<RateLimiter>,
    pub docs: ApiDocs,
    pub routes: RouteTable,
}

impl AppServices {
    pub fn new(config: &Config, routes: RouteTable) -> Result<Self, AppError> {
        let docs = ApiDocs::generate(API_PREFIX, routes.docs().clone())?;

        Ok(Self {
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            docs,
            routes,
        })
    }

    /// Services with an empty route table
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(config, RouteTable::new())
    }
}

/// A fully assembled server that has not started listening
pub struct Server {
    router: Router,
    address: SocketAddr,
    shutdown_timeout: Duration,
}

/// Register every stage in its fixed order.
///
/// `Router::layer` wraps everything added before it, so the calls below go
/// from the innermost stage outwards. A request therefore meets: error
/// boundary, security headers, CORS, parameter-pollution guard, rate limiter,
/// body decoder, compression, access log, then the documentation endpoints,
/// the route table, the built-in endpoints and finally the 404 responder, which also answers
/// a known path requested with a method it does not serve.
pub fn build_server(config: &Config, services: AppServices) -> Server {
    let AppServices {
        limiter,
        docs,
        routes,
    } = services;

    let rate_limit = RateLimitState::new(limiter, config.rate_limit.trust_proxy);
    let pollution_guard = ParameterPollutionGuard::new(&config.parameter_pollution);

    let mut router = Router::new().merge(docs.router());

    if !routes.is_empty() {
        let (api, _) = routes.into_parts();
        router = router.nest(API_PREFIX, api);
    }

    let router = router
        .route("/health", get(system::health))
        .route("/", get(system::welcome))
        .fallback(route_not_found)
        .method_not_allowed_fallback(route_not_found)
        .layer(CatchPanicLayer::custom(panic_to_error))
        .layer(access_log_layer())
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn_with_state(config.body, decode_body))
        .layer(middleware::from_fn_with_state(rate_limit, enforce))
        .layer(middleware::from_fn_with_state(pollution_guard, guard_parameters))
        .layer(cors_layer(&config.cors))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(render_errors));

    Server {
        router,
        address: config.server.address(),
        shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout_secs),
    }
}

impl Server {
    /// The assembled pipeline, for in-process requests
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Configured listen address
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Serve until Ctrl+C or SIGTERM, then drain open connections
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve until `signal` resolves.
    ///
    /// In-flight requests get `shutdown_timeout` to finish before the server
    /// stops waiting for them.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(address = %listener.local_addr()?, "Server listening");

        let draining = Arc::new(Notify::new());
        let notify = draining.clone();

        let server = axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            signal.await;
            notify.notify_one();
        })
        .into_future();

        let timeout = self.shutdown_timeout;
        let deadline = async move {
            draining.notified().await;
            info!("Waiting up to {} seconds for connections to close", timeout.as_secs());
            tokio::time::sleep(timeout).await;
        };

        tokio::select! {
            result = server => {
                result?;
                info!("Server shut down gracefully");
            },
            () = deadline => {
                tracing::warn!("Shutdown timeout elapsed, closing remaining connections");
            },
        }

        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

//! Common test utilities for Keel server integration tests
//!
//! Builds the full pipeline in-process with a small demo route group, and
//! provides request/response helpers for `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::Query,
    http::{header, Method, Request, StatusCode},
    response::Response,
    routing::{self, post},
    Json, Router,
};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use utoipa::OpenApi;

use keel_server::{
    api::{build_server, response::ErrorBody, routes::RouteTable, AppServices},
    config::Config,
    middleware::{body::DecodedBody, parameter_pollution::PollutedParameters},
    AppError, AppResult,
};

/// Detail carried by the demo internal failure; must never reach a client.
pub const SECRET_DETAIL: &str = "connection to db-primary:5432 refused";

/// Configuration for tests: test mode plus the given overrides
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("NODE_ENV".to_string(), "test".to_string());
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_map(vars).unwrap()
}

#[utoipa::path(
    get,
    path = "/missing",
    responses((status = 404, description = "Always missing", body = ErrorBody))
)]
async fn missing() -> AppResult<Json<Value>> {
    Err(AppError::not_found("Resource not found"))
}

async fn broken() -> AppResult<Json<Value>> {
    Err(AppError::internal(anyhow::anyhow!(SECRET_DETAIL)))
}

async fn explode() -> Json<Value> {
    panic!("handler exploded");
}

async fn echo(DecodedBody(value): DecodedBody) -> Json<Value> {
    Json(value)
}

#[derive(Debug, Deserialize)]
struct Search {
    q: String,
}

async fn search(request: Request<Body>) -> AppResult<Json<Value>> {
    let Query(search) = Query::<Search>::try_from_uri(request.uri())
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let original = request
        .extensions()
        .get::<PollutedParameters>()
        .and_then(|polluted| polluted.get("q"))
        .map(|values| values.to_vec())
        .unwrap_or_default();

    Ok(Json(json!({ "q": search.q, "original": original })))
}

#[derive(OpenApi)]
#[openapi(paths(missing))]
struct DemoDoc;

/// Route group mounted at `/api/v1/demo`
pub fn demo_routes() -> RouteTable {
    let router = Router::new()
        .route("/missing", routing::get(missing))
        .route("/broken", routing::get(broken))
        .route("/panic", routing::get(explode))
        .route("/echo", post(echo))
        .route("/search", routing::get(search));

    RouteTable::new().documented_group("/demo", router, DemoDoc::openapi())
}

/// Full pipeline with the demo routes
pub fn test_app(config: &Config) -> Router {
    let services = AppServices::new(config, demo_routes()).unwrap();
    build_server(config, services).router()
}

/// Full pipeline with default test configuration
pub fn default_app() -> Router {
    test_app(&test_config(&[]))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Assert the uniform error shape
pub async fn assert_error(response: Response, status: StatusCode, message: &str) {
    assert_eq!(response.status(), status);
    assert_eq!(
        body_json(response).await,
        json!({ "status": "error", "message": message })
    );
}

/// In-memory log sink for a scoped subscriber
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture every record emitted on this thread until the guard drops
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    (logs, tracing::subscriber::set_default(subscriber))
}

//! API documentation endpoints
//!
//! The OpenAPI document is generated once at startup from the annotated
//! handlers and schemas, then served verbatim: as an interactive viewer at
//! [`DOCS_UI_PATH`] and as raw JSON at [`DOCS_JSON_PATH`].

use axum::{body::Bytes, http::header, routing::get, Router};
use std::sync::Arc;
use utoipa::openapi::OpenApi as OpenApiDocument;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use super::response::{ErrorBody, HealthResponse, WelcomeResponse};
use super::system;
use crate::error::AppError;

pub const DOCS_UI_PATH: &str = "/api-docs";
pub const DOCS_JSON_PATH: &str = "/api-docs.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keel API",
        description = "HTTP API served behind a fixed request pipeline"
    ),
    paths(system::health, system::welcome),
    components(schemas(ErrorBody, HealthResponse, WelcomeResponse)),
    tags((name = "system", description = "Liveness probe and welcome endpoints"))
)]
pub struct ApiDoc;

/// The immutable documentation document and its serialized form
#[derive(Clone)]
pub struct ApiDocs {
    spec: Arc<OpenApiDocument>,
    json: Bytes,
}

impl ApiDocs {
    pub fn new(spec: OpenApiDocument) -> Result<Self, AppError> {
        let json = spec
            .to_pretty_json()
            .map_err(|e| AppError::Startup(format!("Failed to serialize API docs: {e}")))?;

        Ok(Self {
            spec: Arc::new(spec),
            json: Bytes::from(json),
        })
    }

    /// Document for the built-in endpoints, with `extra` nested under `prefix`
    pub fn generate(prefix: &str, extra: OpenApiDocument) -> Result<Self, AppError> {
        Self::new(ApiDoc::openapi().nest(prefix, extra))
    }

    pub fn spec(&self) -> &OpenApiDocument {
        &self.spec
    }

    /// Serialized document, byte for byte what `/api-docs.json` serves
    pub fn json(&self) -> &Bytes {
        &self.json
    }

    pub fn router(&self) -> Router {
        let json = self.json.clone();

        Router::new()
            .merge(Scalar::with_url(DOCS_UI_PATH, self.spec().clone()))
            .route(
                DOCS_JSON_PATH,
                get(move || {
                    let json = json.clone();
                    async move { ([(header::CONTENT_TYPE, "application/json")], json) }
                }),
            )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use utoipa::openapi::OpenApiBuilder;

    #[test]
    fn test_builtin_paths_are_documented() {
        let docs = ApiDocs::new(ApiDoc::openapi()).unwrap();

        assert!(docs.spec().paths.paths.contains_key("/health"));
        assert!(docs.spec().paths.paths.contains_key("/"));
        assert_eq!(docs.spec().info.title, "Keel API");
    }

    #[test]
    fn test_json_matches_spec() {
        let docs = ApiDocs::new(ApiDoc::openapi()).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(docs.json()).unwrap();

        assert_eq!(parsed["info"]["title"], "Keel API");
        assert!(parsed["components"]["schemas"]["ErrorBody"].is_object());
    }

    #[test]
    fn test_empty_extra_document_adds_nothing() {
        let docs = ApiDocs::generate("/api/v1", OpenApiBuilder::new().build()).unwrap();
        assert_eq!(docs.spec().paths.paths.len(), 2);
    }
}

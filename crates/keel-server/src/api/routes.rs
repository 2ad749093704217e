//! Route table
//!
//! Handler groups register here under their own prefix; the whole table is
//! mounted below [`super::API_PREFIX`]. A group may bring the OpenAPI fragment
//! describing its handlers, which is folded into the served documentation.

use axum::Router;
use utoipa::openapi::{OpenApi, OpenApiBuilder};

pub struct RouteTable {
    router: Router,
    docs: OpenApi,
    prefixes: Vec<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            docs: OpenApiBuilder::new().build(),
            prefixes: Vec::new(),
        }
    }

    /// Mount `router` under `prefix` (for example `/users`)
    pub fn group(mut self, prefix: &str, router: Router) -> Self {
        let prefix = normalize_prefix(prefix);
        self.router = if prefix.is_empty() {
            self.router.merge(router)
        } else {
            self.router.nest(&prefix, router)
        };
        self.prefixes.push(prefix);
        self
    }

    /// Like [`RouteTable::group`], also documenting the group's handlers
    pub fn documented_group(mut self, prefix: &str, router: Router, docs: OpenApi) -> Self {
        let path = normalize_prefix(prefix);
        self.docs = self.docs.nest(path, docs);
        self.group(prefix, router)
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn docs(&self) -> &OpenApi {
        &self.docs
    }

    pub fn into_parts(self) -> (Router, OpenApi) {
        (self.router, self.docs)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `users/` and `/users` both become `/users`; `/` becomes empty
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(normalize_prefix("users"), "/users");
        assert_eq!(normalize_prefix("/users/"), "/users");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_empty_table() {
        let table = RouteTable::new();
        assert!(table.is_empty());
        assert!(table.docs().paths.paths.is_empty());
    }

    #[tokio::test]
    async fn test_groups_are_nested_under_their_prefix() {
        let table = RouteTable::new()
            .group("users", Router::new().route("/", get(|| async { "users" })))
            .group("/orders", Router::new().route("/{id}", get(|| async { "order" })));

        assert_eq!(table.prefixes(), ["/users", "/orders"]);

        let (router, _) = table.into_parts();
        let response = router
            .oneshot(Request::get("/orders/7").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}

//! Integration tests for the request pipeline
//!
//! These tests verify:
//! - Built-in endpoints and the uniform 404
//! - Error boundary behaviour for classified, internal and panicking handlers
//! - Security headers, CORS, parameter-pollution guard, body decoding
//! - Compression and the documentation endpoints

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use flate2::read::GzDecoder;
use serde_json::json;
use std::io::Read;

use common::{
    assert_error, body_bytes, body_json, capture_logs, default_app, get, json_request, send,
    test_app, test_config, SECRET_DETAIL,
};

#[tokio::test]
async fn test_health_check() {
    let app = default_app();

    let response = send(&app, get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_health_check_is_repeatable() {
    let app = default_app();

    for _ in 0..5 {
        let response = send(&app, get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }
}

#[tokio::test]
async fn test_welcome_root() {
    let app = default_app();

    let response = send(&app, get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "message": "Welcome to the API" })
    );
}

#[tokio::test]
async fn test_unmatched_routes_get_uniform_404() {
    let app = default_app();

    for uri in ["/nope", "/api/v1", "/api/v1/demo/unknown", "/health/extra"] {
        let response = send(&app, get(uri)).await;
        assert_error(response, StatusCode::NOT_FOUND, "Route not found").await;
    }

    let response = send(
        &app,
        json_request(Method::DELETE, "/does/not/exist", "{}"),
    )
    .await;
    assert_error(response, StatusCode::NOT_FOUND, "Route not found").await;
}

#[tokio::test]
async fn test_wrong_method_on_known_path_gets_uniform_404() {
    let app = default_app();

    for (method, uri) in [
        (Method::POST, "/health"),
        (Method::DELETE, "/"),
        (Method::PUT, "/api/v1/demo/missing"),
        (Method::GET, "/api/v1/demo/echo"),
    ] {
        let response = send(&app, json_request(method, uri, "{}")).await;
        assert_error(response, StatusCode::NOT_FOUND, "Route not found").await;
    }
}

#[tokio::test]
async fn test_application_error_passes_through() {
    let app = default_app();

    let response = send(&app, get("/api/v1/demo/missing")).await;

    assert_error(response, StatusCode::NOT_FOUND, "Resource not found").await;
}

#[tokio::test]
async fn test_internal_error_is_logged_not_leaked() {
    let (logs, _guard) = capture_logs();
    let app = default_app();

    let response = send(&app, get("/api/v1/demo/broken")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_bytes(response).await;
    let text = String::from_utf8(body).unwrap();
    assert!(!text.contains(SECRET_DETAIL));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&text).unwrap(),
        json!({ "status": "error", "message": "Internal server error" })
    );

    let logged = logs.contents();
    assert!(logged.contains(SECRET_DETAIL), "log was: {logged}");
    assert!(logged.contains("ERROR"));
}

#[tokio::test]
async fn test_panicking_handler_becomes_500() {
    let (logs, _guard) = capture_logs();
    let app = default_app();

    let response = send(&app, get("/api/v1/demo/panic")).await;

    assert_error(response, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").await;
    assert!(logs.contents().contains("handler exploded"));
}

#[tokio::test]
async fn test_security_headers_on_success_and_error() {
    let app = default_app();

    for uri in ["/health", "/missing-route"] {
        let response = send(&app, get(uri)).await;
        let headers = response.headers();

        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["referrer-policy"], "no-referrer");
        assert_eq!(headers["x-xss-protection"], "0");
        assert!(headers.contains_key("strict-transport-security"));
        assert!(headers.contains_key("content-security-policy"));
        assert!(!headers.contains_key("x-powered-by"));
    }
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = default_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/demo/echo")
        .header(header::ORIGIN, "https://client.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
    assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .contains("POST"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let config = test_config(&[
        ("CORS_ORIGINS", "https://app.example"),
        ("CORS_ALLOW_CREDENTIALS", "true"),
    ]);
    let app = test_app(&config);

    let allowed = Request::get("/health")
        .header(header::ORIGIN, "https://app.example")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, allowed).await;
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );

    let denied = Request::get("/health")
        .header(header::ORIGIN, "https://other.example")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, denied).await;
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_repeated_query_keys_collapse_to_last_value() {
    let app = default_app();

    let response = send(&app, get("/api/v1/demo/search?q=first&q=second")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "q": "second", "original": ["first", "second"] })
    );
}

#[tokio::test]
async fn test_single_query_key_is_untouched() {
    let app = default_app();

    let response = send(&app, get("/api/v1/demo/search?q=only")).await;

    assert_eq!(
        body_json(response).await,
        json!({ "q": "only", "original": [] })
    );
}

#[tokio::test]
async fn test_whitelisted_query_keys_are_not_collapsed() {
    let app = test_app(&test_config(&[("HPP_WHITELIST", "q")]));

    let response = send(&app, get("/api/v1/demo/search?q=a&q=b")).await;

    // Both values reach the handler, so the single-value extractor rejects them
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_json_body_is_decoded() {
    let app = default_app();

    let response = send(
        &app,
        json_request(Method::POST, "/api/v1/demo/echo", r#"{"name":"keel","tags":[1,2]}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "name": "keel", "tags": [1, 2] })
    );
}

#[tokio::test]
async fn test_form_body_is_decoded() {
    let app = default_app();

    let request = Request::post("/api/v1/demo/echo")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=keel&mode=fast+lane"))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "name": "keel", "mode": "fast lane" })
    );
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = default_app();

    let response = send(
        &app,
        json_request(Method::POST, "/api/v1/demo/echo", r#"{"name": "#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Malformed JSON body"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = test_app(&test_config(&[("BODY_LIMIT_BYTES", "64")]));
    let payload = json!({ "blob": "x".repeat(200) }).to_string();

    let response = send(&app, json_request(Method::POST, "/api/v1/demo/echo", payload)).await;

    assert_error(
        response,
        StatusCode::PAYLOAD_TOO_LARGE,
        "Request body exceeds the 64 byte limit",
    )
    .await;
}

#[tokio::test]
async fn test_missing_body_is_a_bad_request() {
    let app = default_app();

    let response = send(&app, json_request(Method::POST, "/api/v1/demo/echo", "")).await;

    assert_error(
        response,
        StatusCode::BAD_REQUEST,
        "Expected a JSON or form-encoded request body",
    )
    .await;
}

#[tokio::test]
async fn test_responses_are_compressed_when_accepted() {
    let app = default_app();

    let request = Request::get("/api-docs.json")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");

    let compressed = body_bytes(response).await;
    let mut decoded = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    let spec: serde_json::Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(spec["info"]["title"], "Keel API");
}

#[tokio::test]
async fn test_error_bodies_are_not_double_encoded() {
    let app = default_app();

    let request = Request::get("/missing-route")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
    assert_error(response, StatusCode::NOT_FOUND, "Route not found").await;
}

#[tokio::test]
async fn test_docs_json_endpoint() {
    let app = default_app();

    let response = send(&app, get("/api-docs.json")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let spec = body_json(response).await;
    assert!(spec["paths"]["/health"].is_object());
    assert!(spec["paths"]["/"].is_object());
    assert!(spec["paths"]["/api/v1/demo/missing"].is_object());
}

#[tokio::test]
async fn test_docs_ui_endpoint() {
    let app = default_app();

    let response = send(&app, get("/api-docs")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(headers["content-security-policy"]
        .to_str()
        .unwrap()
        .contains("https://cdn.jsdelivr.net"));

    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("Keel API"));
}

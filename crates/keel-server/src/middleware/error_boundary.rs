//! Terminal error boundary
//!
//! Every stage and handler reports failure by returning an [`AppError`], which
//! leaves only a status code and an [`ErrorReport`] marker on the response.
//! [`render_errors`] wraps the whole pipeline and is the single place that
//! writes the client-visible body:
//!
//! - classified errors keep their status and message;
//! - unclassified errors are logged in full and answered with a generic 500.
//!
//! Bare error responses produced by the framework itself (such as an extractor
//! rejection) are brought into the same shape.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::{BodyExt, Limited};
use std::any::Any;

use crate::api::response::ErrorBody;
use crate::error::{AppError, ErrorReport, INTERNAL_ERROR_MESSAGE};

/// Message of the catch-all 404.
pub const ROUTE_NOT_FOUND_MESSAGE: &str = "Route not found";

/// Largest framework rejection text reused as a message.
const REJECTION_TEXT_LIMIT: usize = 4 * 1024;

/// Responder for every path no route matched
pub async fn route_not_found() -> AppError {
    AppError::not_found(ROUTE_NOT_FOUND_MESSAGE)
}

/// Turn a caught handler panic into an unclassified failure
pub fn panic_to_error(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "non-string panic payload".to_string()
    };

    AppError::internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

/// Render failures into the uniform `{status, message}` body
pub async fn render_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    if let Some(report) = response.extensions().get::<ErrorReport>().cloned() {
        let error = report.error();
        if !error.is_classified() {
            tracing::error!(error = ?error, %method, %uri, "Unhandled error while processing request");
        }
        return replace_body(response, error.status(), error.client_message());
    }

    if is_bare_error(&response) {
        return normalize(response, &method, &uri).await;
    }

    response
}

/// Error status without a JSON body of its own
fn is_bare_error(response: &Response) -> bool {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return false;
    }

    match response.headers().get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|v| v.starts_with("text/plain"))
            .unwrap_or(false),
    }
}

async fn normalize(response: Response, method: &Method, uri: &Uri) -> Response {
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(%status, %method, %uri, "Request failed without an error report");
        return replace_body(response, status, INTERNAL_ERROR_MESSAGE);
    }

    let fallback = status.canonical_reason().unwrap_or("Request failed").to_string();
    if response.headers().contains_key(header::CONTENT_ENCODING) {
        return replace_body(response, status, &fallback);
    }

    let (parts, body) = response.into_parts();
    let text = Limited::new(body, REJECTION_TEXT_LIMIT)
        .collect()
        .await
        .ok()
        .and_then(|collected| String::from_utf8(collected.to_bytes().to_vec()).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    let message = text.unwrap_or(fallback);
    replace_body(Response::from_parts(parts, Body::empty()), status, &message)
}

/// Swap in the JSON body, keeping headers other stages already set
fn replace_body(response: Response, status: StatusCode, message: &str) -> Response {
    let (parts, _) = response.into_parts();
    let mut rendered = (status, Json(ErrorBody::new(message))).into_response();

    copy_headers(&parts.headers, rendered.headers_mut());
    rendered
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if name == header::CONTENT_TYPE
            || name == header::CONTENT_LENGTH
            || name == header::CONTENT_ENCODING
        {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
    to.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
}

//! Request body decoder
//!
//! JSON (`application/json`, `application/*+json`) and URL-encoded form bodies
//! are buffered up to the configured limit and parsed once. The parsed value is
//! stored as a [`DecodedBody`] extension and the raw bytes are put back, so
//! handlers may use either the decoded value or a typed extractor.

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{map::Entry, Map, Value};
use url::form_urlencoded;

use crate::config::BodyConfig;
use crate::error::AppError;

/// Parsed request body
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody(pub Value);

impl<S> FromRequestParts<S> for DecodedBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<DecodedBody>()
            .cloned()
            .ok_or_else(|| AppError::bad_request("Expected a JSON or form-encoded request body"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
    {
        Some(BodyKind::Json)
    } else if mime == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn too_large(limit: usize) -> AppError {
    AppError::validation(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("Request body exceeds the {limit} byte limit"),
    )
}

/// Repeated form keys become arrays.
fn decode_form(bytes: &[u8]) -> Value {
    let mut fields = Map::new();
    for (key, value) in form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match fields.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            },
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                },
            },
        }
    }
    Value::Object(fields)
}

fn decode(kind: BodyKind, bytes: &[u8]) -> Result<Value, AppError> {
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .map_err(|e| AppError::bad_request(format!("Malformed JSON body: {e}"))),
        BodyKind::Form => Ok(decode_form(bytes)),
    }
}

async fn buffer(body: Body, limit: usize) -> Result<Bytes, AppError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(too_large(limit)),
        Err(err) => Err(AppError::bad_request(format!(
            "Failed to read request body: {err}"
        ))),
    }
}

/// Decode JSON and form bodies; every other request passes through untouched
pub async fn decode_body(State(config): State<BodyConfig>, request: Request, next: Next) -> Response {
    let Some(kind) = body_kind(request.headers()) else {
        return next.run(request).await;
    };

    let limit = config.limit_bytes;
    if declared_length(request.headers()).is_some_and(|len| len > limit) {
        return too_large(limit).into_response();
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match buffer(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };

    if !bytes.is_empty() {
        match decode(kind, &bytes) {
            Ok(value) => {
                parts.extensions.insert(DecodedBody(value));
            },
            Err(err) => return err.into_response(),
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

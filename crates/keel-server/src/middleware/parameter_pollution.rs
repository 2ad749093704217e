//! HTTP parameter-pollution guard
//!
//! A key repeated in the query string (`?sort=asc&sort=desc`) is collapsed to
//! its last value before any handler sees it, so typed extractors never fail
//! or pick an attacker-chosen value. Whitelisted keys keep every value.

use axum::{
    extract::{Request, State},
    http::{uri::PathAndQuery, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use url::form_urlencoded;

use crate::config::ParameterPollutionConfig;
use crate::error::AppError;

/// Original values of every key the guard collapsed, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollutedParameters(pub HashMap<String, Vec<String>>);

impl PollutedParameters {
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterPollutionGuard {
    whitelist: Arc<HashSet<String>>,
}

impl ParameterPollutionGuard {
    pub fn new(config: &ParameterPollutionConfig) -> Self {
        Self {
            whitelist: Arc::new(config.whitelist.iter().cloned().collect()),
        }
    }

    /// Collapse repeated keys of `query`.
    ///
    /// Returns `None` when nothing needed collapsing. Segments that are kept
    /// appear in the rewritten query exactly as the client sent them.
    pub fn sanitize(&self, query: &str) -> Option<(String, PollutedParameters)> {
        // (raw segment, decoded key, decoded value)
        let mut segments: Vec<(&str, String, String)> = Vec::new();
        for segment in query.split('&').filter(|segment| !segment.is_empty()) {
            if let Some((key, value)) = form_urlencoded::parse(segment.as_bytes()).next() {
                segments.push((segment, key.into_owned(), value.into_owned()));
            }
        }

        let mut values: HashMap<&str, Vec<String>> = HashMap::new();
        let mut last_segment: HashMap<&str, &str> = HashMap::new();
        for (segment, key, value) in &segments {
            values.entry(key.as_str()).or_default().push(value.clone());
            last_segment.insert(key.as_str(), *segment);
        }

        let polluted: HashMap<String, Vec<String>> = values
            .into_iter()
            .filter(|(key, vals)| vals.len() > 1 && !self.whitelist.contains(*key))
            .map(|(key, vals)| (key.to_string(), vals))
            .collect();

        if polluted.is_empty() {
            return None;
        }

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut kept: Vec<&str> = Vec::with_capacity(segments.len());
        for (segment, key, _) in &segments {
            if !polluted.contains_key(key) {
                kept.push(*segment);
            } else if emitted.insert(key.as_str()) {
                kept.push(last_segment.get(key.as_str()).copied().unwrap_or(*segment));
            }
        }

        Some((kept.join("&"), PollutedParameters(polluted)))
    }
}

/// Rewrite the request URI so every non-whitelisted key appears once
pub async fn guard_parameters(
    State(guard): State<ParameterPollutionGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some((query, polluted)) = request.uri().query().and_then(|q| guard.sanitize(q)) else {
        return next.run(request).await;
    };

    match rewrite_query(request.uri(), &query) {
        Ok(uri) => {
            tracing::debug!(
                keys = ?polluted.0.keys().collect::<Vec<_>>(),
                "Collapsed repeated query parameters"
            );
            *request.uri_mut() = uri;
            request.extensions_mut().insert(polluted);
            next.run(request).await
        },
        Err(err) => err.into_response(),
    }
}

fn rewrite_query(uri: &Uri, query: &str) -> Result<Uri, AppError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|_| AppError::bad_request("Malformed query string"))?,
    );

    Uri::from_parts(parts).map_err(|_| AppError::bad_request("Malformed query string"))
}

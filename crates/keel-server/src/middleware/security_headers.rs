//! Defensive response headers

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::api::docs::DOCS_UI_PATH;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self';base-uri 'self';\
font-src 'self' https: data:;form-action 'self';frame-ancestors 'self';\
img-src 'self' data:;object-src 'none';script-src 'self';script-src-attr 'none';\
style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests";

/// The documentation viewer embeds the spec inline and loads its bundle from a CDN.
const DOCS_CONTENT_SECURITY_POLICY: &str = "default-src 'self';base-uri 'self';\
font-src 'self' https: data:;form-action 'self';frame-ancestors 'self';\
img-src 'self' data: https:;object-src 'none';\
script-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net;script-src-attr 'none';\
style-src 'self' https: 'unsafe-inline';connect-src 'self' https:";

const DEFAULT_HEADERS: [(&str, &str); 11] = [
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

const POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Add the security header set to every response.
///
/// Headers a handler already set are left alone.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let csp = if request.uri().path() == DOCS_UI_PATH {
        DOCS_CONTENT_SECURITY_POLICY
    } else {
        CONTENT_SECURITY_POLICY
    };

    let mut response = next.run(request).await;
    apply(response.headers_mut(), csp);
    response
}

fn apply(headers: &mut HeaderMap, csp: &'static str) {
    headers.remove(POWERED_BY);

    let policy = std::iter::once(("content-security-policy", csp));
    for (name, value) in policy.chain(DEFAULT_HEADERS) {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert_with(|| HeaderValue::from_static(value));
    }
}

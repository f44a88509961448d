//! Status-code and transport-error classification.
//!
//! The clients share one free-function classifier instead of per-client
//! error hierarchies; every failure becomes an [`UpstreamError`] carrying
//! the attributed service and a taxonomy kind.

use reqwest::StatusCode;
use spiegel_core::{ErrorKind, Service, UpstreamError};

/// Map a non-success HTTP status to an [`UpstreamError`].
pub fn classify_status(service: Service, status: StatusCode, body: &str) -> UpstreamError {
    let (kind, message) = match status.as_u16() {
        401 => (
            ErrorKind::Auth,
            "credentials are invalid or expired".to_string(),
        ),
        403 => (
            ErrorKind::Auth,
            "credentials lack the required permissions".to_string(),
        ),
        404 => (ErrorKind::NotFound, "resource not found".to_string()),
        429 => (ErrorKind::Throttled, "rate limited (429)".to_string()),
        code => (
            ErrorKind::Server,
            format!("request failed with status {}: {}", code, truncate_body(body)),
        ),
    };
    UpstreamError::new(service, kind, message)
}

/// Map a reqwest transport failure to an [`UpstreamError`].
pub fn classify_transport(service: Service, err: &reqwest::Error) -> UpstreamError {
    let kind = if err.is_connect() || err.is_timeout() {
        ErrorKind::Unavailable
    } else if err.is_decode() {
        ErrorKind::Malformed
    } else {
        ErrorKind::Server
    };
    let message = if kind == ErrorKind::Unavailable {
        format!("upstream unreachable: {err}")
    } else {
        err.to_string()
    };
    UpstreamError::new(service, kind, message)
}

/// Cap error bodies so log lines and API responses stay readable.
pub(crate) fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

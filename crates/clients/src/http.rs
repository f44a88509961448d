//! Shared request plumbing: cancellation-aware send and strict JSON parsing.

use serde::de::DeserializeOwned;
use spiegel_core::{Service, UpstreamError};
use tokio_util::sync::CancellationToken;

use crate::classify::classify_transport;

/// Send a request, racing it against the cancel token so in-flight calls
/// abort instead of running to completion after a cancel.
pub(crate) async fn send_with_cancel(
    service: Service,
    cancel: &CancellationToken,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, UpstreamError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(UpstreamError::cancelled(service)),
        result = request.send() => result.map_err(|e| classify_transport(service, &e)),
    }
}

/// Parse a 2xx body into a strict record; shape mismatches are
/// `Malformed`, never silently defaulted.
pub(crate) async fn parse_json<T: DeserializeOwned>(
    service: Service,
    response: reqwest::Response,
) -> Result<T, UpstreamError> {
    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(service, &e))?;
    serde_json::from_str(&body)
        .map_err(|e| UpstreamError::malformed(service, format!("invalid response body: {e}")))
}

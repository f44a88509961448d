//! One-shot credential validation endpoints.
//!
//! POST variants probe with caller-supplied credentials; GET variants use
//! the stored settings + secrets. Both return `{valid, error?}` and never
//! fail the HTTP request itself.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use spiegel_clients::{AzureDevOpsClient, GithubClient, StackOverflowClient, ValidationOutcome};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::upstreams;

use super::{internal_error, ApiResult};

// ── Payloads ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackerPayload {
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub pat: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScmPayload {
    #[serde(default)]
    pub api_url: Option<String>,
    pub token: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QaInternalPayload {
    pub key: String,
}

// ── Work-item tracker ─────────────────────────────────────────

/// POST /api/validate/tracker.
#[utoipa::path(
    post,
    path = "/api/validate/tracker",
    tag = "Validation",
    request_body = TrackerPayload,
    responses((status = 200, description = "Validation outcome", body = Object))
)]
pub async fn validate_tracker(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TrackerPayload>,
) -> ApiResult<Json<ValidationOutcome>> {
    let settings = state.settings.load().map_err(internal_error)?;
    let client = AzureDevOpsClient::new(
        &state.config.upstreams.devops_base,
        payload.org.unwrap_or(settings.azure_dev_ops.org),
        payload.project.unwrap_or(settings.azure_dev_ops.project),
        payload
            .api_version
            .unwrap_or(settings.azure_dev_ops.api_version),
        payload.username.unwrap_or_default(),
        payload.pat,
    );
    let outcome = client.validate(&CancellationToken::new()).await;
    Ok(Json(ValidationOutcome::from(outcome)))
}

/// GET /api/validate/tracker — stored credentials.
#[utoipa::path(
    get,
    path = "/api/validate/tracker",
    tag = "Validation",
    responses((status = 200, description = "Validation outcome", body = Object))
)]
pub async fn validate_tracker_stored(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ValidationOutcome>> {
    let settings = state.settings.load().map_err(internal_error)?;
    let outcome = match upstreams::build_tracker(&state, &settings) {
        Ok(client) => client.validate(&CancellationToken::new()).await,
        Err(e) => Err(e),
    };
    Ok(Json(ValidationOutcome::from(outcome)))
}

// ── SCM ───────────────────────────────────────────────────────

/// POST /api/validate/scm.
#[utoipa::path(
    post,
    path = "/api/validate/scm",
    tag = "Validation",
    request_body = ScmPayload,
    responses((status = 200, description = "Validation outcome", body = Object))
)]
pub async fn validate_scm(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ScmPayload>,
) -> ApiResult<Json<ValidationOutcome>> {
    let settings = state.settings.load().map_err(internal_error)?;
    let client = GithubClient::new(
        payload.api_url.unwrap_or(settings.github.api_url),
        payload.token,
    );
    let outcome = client.validate(&CancellationToken::new()).await;
    Ok(Json(ValidationOutcome::from(outcome)))
}

/// GET /api/validate/scm — stored credentials.
#[utoipa::path(
    get,
    path = "/api/validate/scm",
    tag = "Validation",
    responses((status = 200, description = "Validation outcome", body = Object))
)]
pub async fn validate_scm_stored(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ValidationOutcome>> {
    let settings = state.settings.load().map_err(internal_error)?;
    let outcome = match upstreams::build_github(&state, &settings) {
        Ok(client) => client.validate(&CancellationToken::new()).await,
        Err(e) => Err(e),
    };
    Ok(Json(ValidationOutcome::from(outcome)))
}

// ── Internal question board ───────────────────────────────────

/// POST /api/validate/qa-internal.
#[utoipa::path(
    post,
    path = "/api/validate/qa-internal",
    tag = "Validation",
    request_body = QaInternalPayload,
    responses((status = 200, description = "Validation outcome", body = Object))
)]
pub async fn validate_qa_internal(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QaInternalPayload>,
) -> ApiResult<Json<ValidationOutcome>> {
    let client = StackOverflowClient::internal(
        &state.config.upstreams.internal_api,
        &state.config.upstreams.internal_web,
        payload.key,
    );
    let outcome = client.validate(&CancellationToken::new()).await;
    Ok(Json(ValidationOutcome::from(outcome)))
}

/// GET /api/validate/qa-internal — stored credentials.
#[utoipa::path(
    get,
    path = "/api/validate/qa-internal",
    tag = "Validation",
    responses((status = 200, description = "Validation outcome", body = Object))
)]
pub async fn validate_qa_internal_stored(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ValidationOutcome>> {
    let outcome = match upstreams::build_internal_board(&state) {
        Ok(client) => client.validate(&CancellationToken::new()).await,
        Err(e) => Err(e),
    };
    Ok(Json(ValidationOutcome::from(outcome)))
}

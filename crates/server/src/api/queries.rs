//! Query-job control: start, poll, cancel, list.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spiegel_core::SourceKind;
use uuid::Uuid;

use crate::jobs::runner::{spawn_query_job, RunPlan};
use crate::jobs::types::{JobStatus, QueryJob};
use crate::settings_store::EnabledServices;
use crate::state::AppState;

use super::{bad_request, internal_error, not_found, ApiErrorResponse, ApiResult};

// ── Request / response shapes ─────────────────────────────────

#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct StartQueryRequest {
    #[schema(value_type = Option<Object>)]
    pub enabled_services: Option<EnabledServices>,
    pub params: Option<QueryParamsInput>,
}

#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParamsInput {
    pub number_of_days_to_query: Option<u16>,
    pub start_hour: Option<u8>,
    pub push_to_tracker: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartQueryResponse {
    pub job_id: Uuid,
}

/// Serialize a job into the poll response shape.
fn job_to_json(job: &QueryJob) -> Value {
    json!({
        "status": *job.status.read().unwrap(),
        "result": *job.result.read().unwrap(),
        "serviceErrors": *job.service_errors.read().unwrap(),
        "error": *job.error.read().unwrap(),
        "progress": *job.progress.read().unwrap(),
        "startEpochMs": job.created_at.timestamp_millis(),
        "elapsedTime": job.elapsed_ms(),
    })
}

fn job_to_summary(job: &QueryJob) -> Value {
    json!({
        "id": job.id,
        "status": *job.status.read().unwrap(),
        "progress": *job.progress.read().unwrap(),
        "createdAt": job.created_at,
        "startEpochMs": job.created_at.timestamp_millis(),
        "elapsedTime": job.elapsed_ms(),
    })
}

// ── Handlers ──────────────────────────────────────────────────

/// POST /api/queries — start a job, return its id immediately.
#[utoipa::path(
    post,
    path = "/api/queries",
    tag = "Queries",
    request_body = StartQueryRequest,
    responses(
        (status = 200, description = "Job accepted", body = StartQueryResponse),
        (status = 400, description = "Parameters out of range", body = ApiErrorResponse)
    )
)]
pub async fn start_query(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartQueryRequest>>,
) -> ApiResult<Json<StartQueryResponse>> {
    let Json(request) = body.unwrap_or_default();
    let settings = state.settings.load().map_err(internal_error)?;

    let enabled_services = request
        .enabled_services
        .unwrap_or(settings.enabled_services);
    let params = request.params.unwrap_or_default();

    let days_back = params
        .number_of_days_to_query
        .unwrap_or(settings.query_defaults.number_of_days_to_query);
    if !(1..=365).contains(&days_back) {
        return Err(bad_request("numberOfDaysToQuery must be within [1, 365]"));
    }
    let start_hour = params
        .start_hour
        .unwrap_or(settings.query_defaults.start_hour);
    if start_hour > 23 {
        return Err(bad_request("startHour must be within [0, 23]"));
    }
    let push_to_tracker = params.push_to_tracker.unwrap_or(settings.push_to_dev_ops);

    let mut enabled = Vec::new();
    if enabled_services.stack_overflow {
        enabled.push(SourceKind::StackOverflow);
    }
    if enabled_services.internal_stack_overflow {
        enabled.push(SourceKind::InternalStackOverflow);
    }
    if enabled_services.github {
        enabled.push(SourceKind::Github);
    }

    let job = spawn_query_job(
        state,
        RunPlan {
            enabled,
            days_back,
            start_hour,
            push_to_tracker,
        },
    );
    Ok(Json(StartQueryResponse { job_id: job.id }))
}

/// GET /api/queries/{id} — poll one job.
#[utoipa::path(
    get,
    path = "/api/queries/{id}",
    tag = "Queries",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job state", body = Object),
        (status = 404, description = "Unknown job", body = ApiErrorResponse)
    )
)]
pub async fn get_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let job = state
        .jobs
        .get(&id)
        .ok_or_else(|| not_found(format!("query job not found: {id}")))?;
    Ok(Json(job_to_json(&job)))
}

/// POST /api/queries/{id}/cancel.
#[utoipa::path(
    post,
    path = "/api/queries/{id}/cancel",
    tag = "Queries",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Cancellation signalled", body = Object),
        (status = 400, description = "Job already terminal", body = ApiErrorResponse),
        (status = 404, description = "Unknown job", body = ApiErrorResponse)
    )
)]
pub async fn cancel_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let job = state
        .jobs
        .get(&id)
        .ok_or_else(|| not_found(format!("query job not found: {id}")))?;

    if job.status() != JobStatus::Running {
        return Err(bad_request(format!(
            "query job is not running (status: {:?})",
            job.status()
        )));
    }

    // Idempotent single-shot signal: aborts in-flight requests and trips
    // the next reconciler checkpoint.
    job.cancel.cancel();
    job.finish(JobStatus::Cancelled);
    Ok(Json(json!({ "success": true })))
}

/// GET /api/queries — summaries of all retained jobs.
#[utoipa::path(
    get,
    path = "/api/queries",
    tag = "Queries",
    responses((status = 200, description = "Job summaries", body = Object))
)]
pub async fn list_queries(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summaries: Vec<Value> = state
        .jobs
        .list()
        .iter()
        .map(|job| job_to_summary(job))
        .collect();
    Json(json!(summaries))
}

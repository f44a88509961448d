//! Settings document CRUD.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::settings_store::Settings;
use crate::state::AppState;

use super::{bad_request, internal_error, ApiErrorResponse, ApiResult};

/// GET /api/settings — the full settings document.
#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "Settings",
    responses(
        (status = 200, description = "Settings document", body = Object),
        (status = 500, description = "Internal error", body = ApiErrorResponse)
    )
)]
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<Json<Settings>> {
    state.settings.load().map(Json).map_err(internal_error)
}

/// PATCH /api/settings — merge a partial document, return the result.
#[utoipa::path(
    patch,
    path = "/api/settings",
    tag = "Settings",
    request_body = Object,
    responses(
        (status = 200, description = "Updated settings", body = Object),
        (status = 400, description = "Patch breaks the document shape", body = ApiErrorResponse)
    )
)]
pub async fn patch_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Settings>> {
    if !patch.is_object() {
        return Err(bad_request("settings patch must be a JSON object"));
    }
    state
        .settings
        .patch(&patch)
        .map(Json)
        .map_err(|e| bad_request(format!("invalid settings patch: {e}")))
}

//! Control-plane endpoint modules.
//!
//! Each sub-module owns one responsibility area; shared helpers and error
//! response types live here in mod.rs.

pub(crate) mod doc;
mod health;
mod queries;
mod secrets;
mod settings;
mod validate;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorResponse {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ApiErrorResponse>);
pub(crate) type ApiResult<T> = Result<T, ApiError>;

// ── Helpers ──────────────────────────────────────────────────────

pub(crate) fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse { error: msg.into() }),
    )
}

pub(crate) fn not_found(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiErrorResponse { error: msg.into() }),
    )
}

pub(crate) fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ── Re-exports ───────────────────────────────────────────────────
// Preserves flat `api::foo` import paths used by router registration.

pub use health::health;
pub use queries::{cancel_query, get_query, list_queries, start_query};
pub use secrets::{check_secrets, delete_secret, get_secret, put_secret};
pub use settings::{get_settings, patch_settings};
pub use validate::{
    validate_qa_internal, validate_qa_internal_stored, validate_scm, validate_scm_stored,
    validate_tracker, validate_tracker_stored,
};

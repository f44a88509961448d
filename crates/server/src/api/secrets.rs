//! Secret CRUD over the closed key set.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::secret_store::is_supported_key;
use crate::state::AppState;

use super::{bad_request, internal_error, ApiErrorResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RevealParams {
    #[serde(default)]
    pub reveal: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretStatus {
    pub has_value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SecretValue {
    pub value: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CheckRequest {
    pub keys: Vec<String>,
}

fn ensure_supported(key: &str) -> ApiResult<()> {
    if is_supported_key(key) {
        Ok(())
    } else {
        Err(bad_request(format!("unsupported secret key: {key}")))
    }
}

/// GET /api/secrets/{key} — presence, and the value with `?reveal=true`.
#[utoipa::path(
    get,
    path = "/api/secrets/{key}",
    tag = "Secrets",
    params(
        ("key" = String, Path, description = "Secret key"),
        ("reveal" = Option<bool>, Query, description = "Include the decrypted value")
    ),
    responses(
        (status = 200, description = "Secret status", body = SecretStatus),
        (status = 400, description = "Unsupported key", body = ApiErrorResponse)
    )
)]
pub async fn get_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<RevealParams>,
) -> ApiResult<Json<SecretStatus>> {
    ensure_supported(&key)?;
    let value = state.secrets.get(&key).map_err(internal_error)?;
    Ok(Json(SecretStatus {
        has_value: value.is_some(),
        value: if params.reveal { value } else { None },
    }))
}

/// PUT /api/secrets/{key} — store a value.
#[utoipa::path(
    put,
    path = "/api/secrets/{key}",
    tag = "Secrets",
    params(("key" = String, Path, description = "Secret key")),
    request_body = SecretValue,
    responses(
        (status = 200, description = "Stored", body = SuccessResponse),
        (status = 400, description = "Unsupported key", body = ApiErrorResponse)
    )
)]
pub async fn put_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<SecretValue>,
) -> ApiResult<Json<SuccessResponse>> {
    ensure_supported(&key)?;
    state
        .secrets
        .set(&key, &body.value)
        .map_err(internal_error)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// DELETE /api/secrets/{key}.
#[utoipa::path(
    delete,
    path = "/api/secrets/{key}",
    tag = "Secrets",
    params(("key" = String, Path, description = "Secret key")),
    responses(
        (status = 200, description = "Deleted (or already absent)", body = SuccessResponse),
        (status = 400, description = "Unsupported key", body = ApiErrorResponse)
    )
)]
pub async fn delete_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    ensure_supported(&key)?;
    state.secrets.delete(&key).map_err(internal_error)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/secrets/check — bulk presence check.
#[utoipa::path(
    post,
    path = "/api/secrets/check",
    tag = "Secrets",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Presence per key", body = Object),
        (status = 400, description = "Unsupported key in request", body = ApiErrorResponse)
    )
)]
pub async fn check_secrets(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckRequest>,
) -> ApiResult<Json<BTreeMap<String, bool>>> {
    let mut result = BTreeMap::new();
    for key in &body.keys {
        ensure_supported(key)?;
        result.insert(key.clone(), state.secrets.has(key).map_err(internal_error)?);
    }
    Ok(Json(result))
}

//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers into a single spec,
//! served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "spiegel API",
        version = "0.1.0",
        description = "Reconciling issue-ingestion engine: polls community issue sources, \
                       reconciles them against the work-item tracker, and mirrors new issues.",
    ),
    tags(
        (name = "Health", description = "Server readiness"),
        (name = "Settings", description = "Settings document CRUD"),
        (name = "Secrets", description = "Encrypted credential storage"),
        (name = "Queries", description = "Asynchronous reconciliation jobs"),
        (name = "Validation", description = "One-shot upstream credential probes"),
    ),
    paths(
        crate::api::health::health,
        crate::api::settings::get_settings,
        crate::api::settings::patch_settings,
        crate::api::secrets::get_secret,
        crate::api::secrets::put_secret,
        crate::api::secrets::delete_secret,
        crate::api::secrets::check_secrets,
        crate::api::queries::start_query,
        crate::api::queries::get_query,
        crate::api::queries::cancel_query,
        crate::api::queries::list_queries,
        crate::api::validate::validate_tracker,
        crate::api::validate::validate_tracker_stored,
        crate::api::validate::validate_scm,
        crate::api::validate::validate_scm_stored,
        crate::api::validate::validate_qa_internal,
        crate::api::validate::validate_qa_internal_stored,
    )
)]
pub struct ApiDoc;

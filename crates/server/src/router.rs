//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route(
            "/api/settings",
            get(api::get_settings).patch(api::patch_settings),
        )
        // Secrets: /check MUST precede /{key} registration for clarity,
        // though the router resolves static segments first anyway.
        .route("/api/secrets/check", post(api::check_secrets))
        .route(
            "/api/secrets/{key}",
            get(api::get_secret)
                .put(api::put_secret)
                .delete(api::delete_secret),
        )
        .route(
            "/api/queries",
            get(api::list_queries).post(api::start_query),
        )
        .route("/api/queries/{id}", get(api::get_query))
        .route("/api/queries/{id}/cancel", post(api::cancel_query))
        .route(
            "/api/validate/tracker",
            get(api::validate_tracker_stored).post(api::validate_tracker),
        )
        .route(
            "/api/validate/scm",
            get(api::validate_scm_stored).post(api::validate_scm),
        )
        .route(
            "/api/validate/qa-internal",
            get(api::validate_qa_internal_stored).post(api::validate_qa_internal),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use spiegel_core::config::{Config, ServerConfig, StorageConfig, UpstreamConfig};
    use tower::ServiceExt;

    fn test_router_with(board_url: &str, tracker_url: &str) -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                cors_origin: "*".into(),
            },
            storage: StorageConfig {
                data_dir: dir.path().to_path_buf(),
            },
            upstreams: UpstreamConfig {
                stack_overflow_api: board_url.into(),
                stack_overflow_web: "https://stackoverflow.com".into(),
                internal_api: board_url.into(),
                internal_web: "https://internal.example.com".into(),
                devops_base: tracker_url.into(),
            },
        };
        let state = Arc::new(AppState::new(config).unwrap());
        (dir, build_router(state))
    }

    fn test_router() -> (tempfile::TempDir, Router) {
        test_router_with("http://localhost:9", "http://localhost:9")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = test_router();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let (_dir, app) = test_router();

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                "/api/settings",
                json!({ "azureDevOps": { "org": "my-org" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["azureDevOps"]["org"], "my-org");
        assert_eq!(body["pushToDevOps"], true);
    }

    #[tokio::test]
    async fn test_secret_endpoints() {
        let (_dir, app) = test_router();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/secrets/scm-token",
                json!({ "value": "tok" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Masked by default, revealed on request.
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/secrets/scm-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body, json!({ "hasValue": true }));

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/secrets/scm-token?reveal=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["value"], "tok");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/secrets/check",
                json!({ "keys": ["scm-token", "tracker-pat"] }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body, json!({ "scm-token": true, "tracker-pat": false }));

        // Unknown keys are rejected, not stored.
        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/secrets/launch-codes",
                json!({ "value": "0000" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_poll_unknown_and_param_validation() {
        let (_dir, app) = test_router();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/queries/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/queries",
                json!({ "params": { "numberOfDaysToQuery": 400 } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/queries",
                json!({ "params": { "startHour": 24 } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_full_query_job_via_api() {
        use httpmock::prelude::*;

        let board = MockServer::start();
        let tracker = MockServer::start();
        board.mock(|when, then| {
            when.method(GET).path("/questions");
            then.status(200).json_body(json!({ "items": [
                { "question_id": 4242, "title": "T" }
            ]}));
        });
        tracker.mock(|when, then| {
            when.method(GET).path("/my-org/_apis/projects");
            then.status(200).json_body(json!({ "count": 1, "value": [] }));
        });
        tracker.mock(|when, then| {
            when.method(POST).path("/my-org/my-project/_apis/wit/wiql");
            then.status(200).json_body(json!({ "workItems": [] }));
        });
        let create = tracker.mock(|when, then| {
            when.method(POST)
                .path("/my-org/my-project/_apis/wit/workitems/$Issue");
            then.status(200).json_body(json!({ "id": 5 }));
        });

        let (_dir, app) = test_router_with(&board.base_url(), &tracker.base_url());

        // Configure entirely through the control plane.
        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                "/api/settings",
                json!({
                    "azureDevOps": { "org": "my-org", "project": "my-project", "apiVersion": "7.0" },
                    "repositories": { "stackOverflow": ["sentry"] },
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/secrets/tracker-pat",
                json!({ "value": "pat" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/queries",
                json!({ "enabledServices": {
                    "stackOverflow": true,
                    "internalStackOverflow": false,
                    "github": false,
                }}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let job_id = body["jobId"].as_str().unwrap().to_string();

        // Poll to completion (the politeness pace makes this take ~2s).
        let mut last = json!(null);
        for _ in 0..600 {
            let response = app
                .clone()
                .oneshot(
                    Request::get(format!("/api/queries/{job_id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            last = body_json(response).await;
            if last["status"] != "running" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert_eq!(last["status"], "completed");
        assert_eq!(last["serviceErrors"], json!([]));
        assert_eq!(last["result"]["stackOverflow"]["status"], 200);
        create.assert_hits(1);
    }

    #[tokio::test]
    async fn test_start_empty_job_and_cancel_terminal_is_rejected() {
        let (_dir, app) = test_router();

        // No sources enabled: completes immediately with an empty result.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/queries",
                json!({ "enabledServices": {
                    "stackOverflow": false,
                    "internalStackOverflow": false,
                    "github": false,
                }}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let job_id = body["jobId"].as_str().unwrap().to_string();

        // Wait for the terminal state, then poll.
        let mut status = String::new();
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(
                    Request::get(format!("/api/queries/{job_id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let body = body_json(response).await;
            status = body["status"].as_str().unwrap_or_default().to_string();
            if status != "running" {
                assert_eq!(body["serviceErrors"], json!([]));
                assert_eq!(body["result"], json!({}));
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, "completed");

        // Cancelling a terminal job is a client error.
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/queries/{job_id}/cancel"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

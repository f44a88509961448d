//! Query-job runner.
//!
//! [`spawn_query_job`] registers a job and returns immediately; the work
//! runs on a background tokio task. The runner resets the run snapshot,
//! rolls the settings timestamps, validates tracker credentials once, then
//! drives the reconcilers in their fixed order. A per-source failure is
//! recorded in `service_errors` and the job still completes; only
//! cancellation and internal failures leave `completed` behind.

use std::sync::Arc;

use chrono::Local;
use spiegel_core::{QueryWindow, SourceKind, UpstreamError};
use spiegel_reconcile::{
    GithubReconciler, ProgressFn, QuestionBoardReconciler, SnapshotSink, SourceReport,
    INTERNAL_QUESTION_PACE, PUBLIC_QUESTION_PACE, REPO_PACE, REPO_THROTTLE_BACKOFF,
};
use tracing::{error, info, warn};

use crate::settings_store::Settings;
use crate::state::AppState;
use crate::upstreams;

use super::log::append_job_log;
use super::types::{JobStatus, QueryJob, ServiceResults};

/// Resolved job parameters, validated by the control plane.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Enabled sources; the runner always processes them in
    /// [`SourceKind::ORDERED`] order.
    pub enabled: Vec<SourceKind>,
    pub days_back: u16,
    pub start_hour: u8,
    pub push_to_tracker: bool,
}

/// Register and launch a query job; returns the job handle immediately.
pub fn spawn_query_job(state: Arc<AppState>, plan: RunPlan) -> Arc<QueryJob> {
    let job = QueryJob::new();
    job.progress.write().unwrap().total = plan.enabled.len() as u32;
    state.jobs.insert(job.clone());
    info!(job_id = %job.id, sources = plan.enabled.len(), "query job started");
    state.telemetry.track_event(
        "query_job_started",
        serde_json::json!({ "jobId": job.id, "sources": plan.enabled.len() }),
    );

    let state2 = state.clone();
    let job2 = job.clone();
    tokio::spawn(async move {
        run_query_job(state2, job2, plan).await;
    });
    job
}

/// Supervise the job body so a panic becomes a terminal `error` status
/// instead of a silently poisoned job.
async fn run_query_job(state: Arc<AppState>, job: Arc<QueryJob>, plan: RunPlan) {
    let handle = tokio::spawn(execute_query_job(state.clone(), job.clone(), plan));
    if let Err(join_err) = handle.await {
        let message = if join_err.is_panic() {
            let payload = join_err.into_panic();
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "query job panicked".to_string())
        } else {
            join_err.to_string()
        };
        error!(job_id = %job.id, error = %message, "query job aborted");
        state.telemetry.track_exception(&message);
        *job.error.write().unwrap() = Some(message);
        job.finish(JobStatus::Error);
        append_job_log(&state.config.storage.data_dir, &job);
    }
}

fn finalize(state: &AppState, job: &QueryJob, terminal: JobStatus) {
    if job.finish(terminal) {
        info!(
            job_id = %job.id,
            status = ?terminal,
            elapsed_ms = job.elapsed_ms(),
            "query job finished"
        );
    }
    if let Err(e) = state.snapshot.finish(Local::now()) {
        warn!(job_id = %job.id, error = %e, "failed to stamp snapshot end time");
    }
    append_job_log(&state.config.storage.data_dir, job);
    state.telemetry.track_event(
        "query_job_finished",
        serde_json::json!({
            "jobId": job.id,
            "status": job.status(),
            "elapsedMs": job.elapsed_ms(),
            "serviceErrors": job.service_errors.read().unwrap().len(),
        }),
    );
}

async fn execute_query_job(state: Arc<AppState>, job: Arc<QueryJob>, plan: RunPlan) {
    let started_local = Local::now();

    if let Err(e) = state.snapshot.reset(started_local) {
        *job.error.write().unwrap() = Some(format!("snapshot reset failed: {e}"));
        job.finish(JobStatus::Error);
        return;
    }

    // One settings read per job; reconcilers get values, not the store.
    let (settings, previous_last_run) =
        match state.settings.roll_timestamps(started_local.with_timezone(&chrono::Utc)) {
            Ok(v) => v,
            Err(e) => {
                *job.error.write().unwrap() = Some(format!("settings read failed: {e}"));
                job.finish(JobStatus::Error);
                return;
            }
        };

    let window = QueryWindow::derive(started_local, plan.days_back, plan.start_hour);
    let enabled: Vec<SourceKind> = SourceKind::ORDERED
        .into_iter()
        .filter(|kind| plan.enabled.contains(kind))
        .collect();

    if enabled.is_empty() {
        *job.result.write().unwrap() = Some(ServiceResults::new());
        finalize(&state, &job, JobStatus::Completed);
        return;
    }

    // Credential pre-flight: one tracker probe before any source fetch.
    if !settings.use_test_data && plan.push_to_tracker {
        let gate = match upstreams::build_tracker(&state, &settings) {
            Ok(tracker) => tracker.validate(&job.cancel).await,
            Err(e) => Err(e),
        };
        if let Err(e) = gate {
            if e.is_cancelled() {
                finalize(&state, &job, JobStatus::Cancelled);
                return;
            }
            warn!(job_id = %job.id, error = %e, "credential validation failed; skipping all sources");
            job.push_service_error(e.service.label(), e.message);
            *job.result.write().unwrap() = Some(ServiceResults::new());
            finalize(&state, &job, JobStatus::Completed);
            return;
        }
    }

    let mut results = ServiceResults::new();
    for kind in enabled {
        job.progress.write().unwrap().current_service = kind.label().to_string();

        match run_source(&state, &job, &settings, &window, previous_last_run, &plan, kind).await {
            Ok(report) => {
                results.insert(kind.section_key(), report);
            }
            Err(e) if e.is_cancelled() => {
                *job.result.write().unwrap() = Some(results);
                finalize(&state, &job, JobStatus::Cancelled);
                return;
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    service = e.service.label(),
                    error = %e.message,
                    "source failed; continuing with next"
                );
                if let Err(sink_err) = state.snapshot.write_error(kind, &e.to_string()).await {
                    warn!(job_id = %job.id, error = %sink_err, "failed to record section error");
                }
                job.push_service_error(e.service.label(), e.message);
            }
        }

        job.progress.write().unwrap().current += 1;
    }

    *job.result.write().unwrap() = Some(results);
    finalize(&state, &job, JobStatus::Completed);
}

fn progress_fn(job: Arc<QueryJob>) -> ProgressFn {
    Arc::new(move |unit: &str| {
        job.progress.write().unwrap().current_service = unit.to_string();
    })
}

async fn run_source(
    state: &Arc<AppState>,
    job: &Arc<QueryJob>,
    settings: &Settings,
    window: &QueryWindow,
    previous_last_run: Option<chrono::DateTime<chrono::Utc>>,
    plan: &RunPlan,
    kind: SourceKind,
) -> Result<SourceReport, UpstreamError> {
    let tracker = upstreams::build_tracker(state, settings)?;
    let sink: Arc<dyn SnapshotSink> = state.snapshot.clone();
    let progress = progress_fn(job.clone());
    let cancel = job.cancel.clone();

    match kind {
        SourceKind::StackOverflow => {
            QuestionBoardReconciler {
                kind,
                client: upstreams::build_public_board(state),
                tracker,
                tags: settings.repositories.stack_overflow.clone(),
                from_unix: window.from_unix,
                push_to_tracker: plan.push_to_tracker,
                pace: PUBLIC_QUESTION_PACE,
                sink,
                progress,
                cancel,
            }
            .run()
            .await
        }
        SourceKind::InternalStackOverflow => {
            QuestionBoardReconciler {
                kind,
                client: upstreams::build_internal_board(state)?,
                tracker,
                tags: settings.repositories.internal_stack_overflow.clone(),
                from_unix: window.from_unix,
                push_to_tracker: plan.push_to_tracker,
                pace: INTERNAL_QUESTION_PACE,
                sink,
                progress,
                cancel,
            }
            .run()
            .await
        }
        SourceKind::Github => {
            GithubReconciler {
                client: upstreams::build_github(state, settings)?,
                tracker,
                org: settings.github.org.clone(),
                repositories: settings.repositories.github.clone(),
                created_after_iso: window.created_after_iso.clone(),
                // The label-event filter compares against the previous
                // run; first runs fall back to the window start.
                last_run: previous_last_run.unwrap_or(window.start_utc),
                push_to_tracker: plan.push_to_tracker,
                pace: REPO_PACE,
                throttle_backoff: REPO_THROTTLE_BACKOFF,
                sink,
                progress,
                cancel,
            }
            .run()
            .await
        }
    }
}

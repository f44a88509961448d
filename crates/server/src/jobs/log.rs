//! Terminal job log.
//!
//! Every finished job appends one line to `{data_dir}/jobs.jsonl`. Each
//! line is self-contained, so plain append is safe; failures are logged
//! and never fail the job.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::types::{JobStatus, QueryJob, ServiceError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobLogEntry {
    id: Uuid,
    status: JobStatus,
    service_errors: Vec<ServiceError>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    elapsed_ms: i64,
}

/// Append a terminated job's summary to `jobs.jsonl`.
pub fn append_job_log(data_dir: &Path, job: &QueryJob) {
    let entry = JobLogEntry {
        id: job.id,
        status: job.status(),
        service_errors: job.service_errors.read().unwrap().clone(),
        error: job.error.read().unwrap().clone(),
        created_at: job.created_at,
        completed_at: *job.completed_at.read().unwrap(),
        elapsed_ms: job.elapsed_ms(),
    };

    let json_line = match serde_json::to_string(&entry) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize job log entry");
            return;
        }
    };

    if let Err(e) = std::fs::create_dir_all(data_dir) {
        warn!(error = %e, "failed to create job log directory");
        return;
    }

    let log_path = data_dir.join("jobs.jsonl");
    let mut file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, path = %log_path.display(), "failed to open job log");
            return;
        }
    };

    if let Err(e) = writeln!(file, "{}", json_line) {
        warn!(error = %e, "failed to write job log entry");
    }
}

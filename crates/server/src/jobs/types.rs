//! Query-job tracking types and the in-memory job registry.
//!
//! Jobs carry a single-shot cancel token shared with all spawned work.
//! Mutable fields use `RwLock` (they change a handful of times over a
//! job's life); the registry is an insertion-ordered map with bounded
//! eviction of the oldest terminal entries.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spiegel_reconcile::SourceReport;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Jobs retained in memory; the oldest beyond this are evicted on insert.
const MAX_RETAINED_JOBS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Error,
}

/// Coarse progress: `total` counts enabled sources; `current_service`
/// carries the intra-source unit name pushed by the reconciler.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub current_service: String,
}

/// One upstream failure surfaced to the caller, attributed by service label.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    pub service: String,
    pub message: String,
}

/// Per-source terminal reports, keyed by snapshot section key.
pub type ServiceResults = BTreeMap<&'static str, SourceReport>;

pub struct QueryJob {
    pub id: Uuid,
    pub status: RwLock<JobStatus>,
    pub cancel: CancellationToken,
    pub progress: RwLock<Progress>,
    pub result: RwLock<Option<ServiceResults>>,
    pub service_errors: RwLock<Vec<ServiceError>>,
    pub error: RwLock<Option<String>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: RwLock<Option<DateTime<Utc>>>,
}

impl QueryJob {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            status: RwLock::new(JobStatus::Running),
            cancel: CancellationToken::new(),
            progress: RwLock::new(Progress::default()),
            result: RwLock::new(None),
            service_errors: RwLock::new(Vec::new()),
            error: RwLock::new(None),
            created_at: Utc::now(),
            completed_at: RwLock::new(None),
        })
    }

    pub fn status(&self) -> JobStatus {
        *self.status.read().unwrap()
    }

    /// Transition out of `Running` exactly once; later attempts are no-ops,
    /// so a cancel-from-handler and the runner's own finalization never
    /// double-set a terminal state.
    pub fn finish(&self, terminal: JobStatus) -> bool {
        let mut status = self.status.write().unwrap();
        if *status != JobStatus::Running {
            return false;
        }
        *status = terminal;
        *self.completed_at.write().unwrap() = Some(Utc::now());
        true
    }

    pub fn elapsed_ms(&self) -> i64 {
        let end = self.completed_at.read().unwrap().unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds()
    }

    pub fn push_service_error(&self, service: &str, message: impl Into<String>) {
        self.service_errors.write().unwrap().push(ServiceError {
            service: service.to_string(),
            message: message.into(),
        });
    }
}

pub struct QueryJobStore {
    jobs: RwLock<IndexMap<Uuid, Arc<QueryJob>>>,
}

impl QueryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(IndexMap::new()),
        }
    }

    pub fn insert(&self, job: Arc<QueryJob>) {
        let mut jobs = self.jobs.write().unwrap();
        jobs.insert(job.id, job);
        // Evict oldest terminal jobs beyond the retention bound; running
        // jobs are never evicted.
        while jobs.len() > MAX_RETAINED_JOBS {
            let evictable = jobs
                .iter()
                .find(|(_, j)| j.status() != JobStatus::Running)
                .map(|(id, _)| *id);
            match evictable {
                Some(id) => {
                    jobs.shift_remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<QueryJob>> {
        self.jobs.read().unwrap().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<QueryJob>> {
        self.jobs.read().unwrap().values().cloned().collect()
    }
}

impl Default for QueryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

//! The reconciliation pipeline: per-source fetch → dedup → normalize →
//! mirror-lookup → diff → create, with cancellation checkpoints and
//! progress reporting.

pub mod normalize;
pub mod reconciler;
pub mod sink;

pub use reconciler::{
    GithubReconciler, GithubRepoSpec, ProgressFn, QuestionBoardReconciler, SourceReport,
    INTERNAL_QUESTION_PACE, PUBLIC_QUESTION_PACE, REPO_PACE, REPO_THROTTLE_BACKOFF,
};
pub use sink::SnapshotSink;

//! Seam between the reconciler and the persisted run snapshot.
//!
//! The reconciler writes each section as soon as it completes (`found →
//! devOps → newIssues`); the server implements this trait over the on-disk
//! run-snapshot store.

use async_trait::async_trait;
use spiegel_core::{IssueBlock, SourceKind, WorkItemMatch};

#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write_found(&self, kind: SourceKind, block: &IssueBlock) -> anyhow::Result<()>;

    async fn write_matches(
        &self,
        kind: SourceKind,
        matches: &[WorkItemMatch],
    ) -> anyhow::Result<()>;

    async fn write_new(&self, kind: SourceKind, block: &IssueBlock) -> anyhow::Result<()>;

    /// Per-source error marker, so a failed source shows up without hiding
    /// successful ones.
    async fn write_error(&self, kind: SourceKind, message: &str) -> anyhow::Result<()>;
}

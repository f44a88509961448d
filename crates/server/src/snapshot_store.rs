//! Run-snapshot document store.
//!
//! A single JSON document at `{data_dir}/run_snapshot.json` with everything
//! under a top-level `index` record. At job start the document is reset to
//! the canonical empty template; reconcilers then apply point-path updates
//! (`index.<section>.found`, `index.<section>.devOps`, ...) as sections
//! complete. Every write is a full-file atomic replace, which is all the
//! locking this workload needs: only the currently-running reconciler
//! writes, and readers see either the old or the new document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde_json::{json, Value};
use spiegel_core::{IssueBlock, RunSnapshot, SectionError, SourceKind, WorkItemMatch};
use spiegel_reconcile::SnapshotSink;

use crate::store_util::write_atomic;

/// Locale-style display rendering for `startTime`/`endTime` (the shape the
/// report layer expects).
pub fn display_time(instant: DateTime<Local>) -> String {
    instant.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("run_snapshot.json"),
        }
    }

    fn load_document(&self) -> anyhow::Result<Value> {
        if !self.path.exists() {
            return Ok(json!({ "index": RunSnapshot::default() }));
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save_document(&self, doc: &Value) -> anyhow::Result<()> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(doc)?)
    }

    /// Overwrite the document with the canonical empty template.
    pub fn reset(&self, start_local: DateTime<Local>) -> anyhow::Result<()> {
        let snapshot =
            RunSnapshot::started(display_time(start_local), start_local.with_timezone(&Utc));
        self.save_document(&json!({ "index": snapshot }))
    }

    /// Point-path update, e.g. `update("index.github.found", value)`.
    /// Intermediate objects are created as needed.
    pub fn update(&self, path: &str, value: Value) -> anyhow::Result<()> {
        let mut doc = self.load_document()?;
        let mut cursor = &mut doc;
        let segments: Vec<&str> = path.split('.').collect();
        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| anyhow::anyhow!("empty update path"))?;

        for segment in parents {
            let map = cursor
                .as_object_mut()
                .ok_or_else(|| anyhow::anyhow!("update path '{}' crosses a non-object", path))?;
            cursor = map.entry(segment.to_string()).or_insert_with(|| json!({}));
        }
        match cursor.as_object_mut() {
            Some(map) => {
                map.insert(leaf.to_string(), value);
            }
            None => anyhow::bail!("update path '{}' crosses a non-object", path),
        }
        self.save_document(&doc)
    }

    /// Stamp the end time when a job terminates.
    pub fn finish(&self, end_local: DateTime<Local>) -> anyhow::Result<()> {
        self.update("index.endTime", json!(display_time(end_local)))?;
        self.update("index.endInstant", json!(end_local.with_timezone(&Utc)))
    }

    pub fn read_document(&self) -> anyhow::Result<Value> {
        self.load_document()
    }

    pub fn read_snapshot(&self) -> anyhow::Result<RunSnapshot> {
        let doc = self.load_document()?;
        Ok(serde_json::from_value(doc["index"].clone())?)
    }
}

#[async_trait]
impl SnapshotSink for SnapshotStore {
    async fn write_found(&self, kind: SourceKind, block: &IssueBlock) -> anyhow::Result<()> {
        self.update(
            &format!("index.{}.found", kind.section_key()),
            serde_json::to_value(block)?,
        )
    }

    async fn write_matches(
        &self,
        kind: SourceKind,
        matches: &[WorkItemMatch],
    ) -> anyhow::Result<()> {
        self.update(
            &format!("index.{}.devOps", kind.section_key()),
            serde_json::to_value(matches)?,
        )
    }

    async fn write_new(&self, kind: SourceKind, block: &IssueBlock) -> anyhow::Result<()> {
        self.update(
            &format!("index.{}.newIssues", kind.section_key()),
            serde_json::to_value(block)?,
        )
    }

    async fn write_error(&self, kind: SourceKind, message: &str) -> anyhow::Result<()> {
        self.update(
            &format!("index.{}.error", kind.section_key()),
            serde_json::to_value(SectionError::new(message))?,
        )
    }
}

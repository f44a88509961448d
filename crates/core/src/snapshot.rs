//! Run snapshot types — the per-job document consumed by the report layer.
//!
//! The persisted document keeps these sections under a single top-level
//! `index` record: `{startTime, endTime, stackOverflow,
//! internalStackOverflow, github}`. Counts are stored redundantly next to
//! their sequences and must always equal the sequence length; the
//! [`IssueBlock::new`] constructor is the only way counts are produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::{NormalizedIssue, SourceKind, WorkItemMatch};

/// An ordered issue sequence with its materialized count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueBlock {
    pub issues: Vec<NormalizedIssue>,
    pub count: u32,
}

impl IssueBlock {
    pub fn new(issues: Vec<NormalizedIssue>) -> Self {
        let count = issues.len() as u32;
        Self { issues, count }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Per-source error marker, so the report layer can show a failed source
/// without hiding successful ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionError {
    pub status: String,
    pub message: String,
}

impl SectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// One source's slice of the run snapshot, written in `found → devOps →
/// newIssues` order as the reconciler progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSection {
    pub found: IssueBlock,
    pub dev_ops: Vec<WorkItemMatch>,
    pub new_issues: IssueBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SectionError>,
}

/// The full per-run snapshot. Reset to the canonical empty template at job
/// start and updated incrementally as sections complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    /// Locale-rendered start/end, for display only.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// UTC companions to the display strings.
    pub start_instant: Option<DateTime<Utc>>,
    pub end_instant: Option<DateTime<Utc>>,
    pub stack_overflow: SourceSection,
    pub internal_stack_overflow: SourceSection,
    pub github: SourceSection,
}

impl RunSnapshot {
    /// The canonical empty template: all counts zero, all sequences empty,
    /// `startTime` set, `endTime` null.
    pub fn started(start_time: String, start_instant: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start_time),
            start_instant: Some(start_instant),
            ..Self::default()
        }
    }

    pub fn section(&self, kind: SourceKind) -> &SourceSection {
        match kind {
            SourceKind::StackOverflow => &self.stack_overflow,
            SourceKind::InternalStackOverflow => &self.internal_stack_overflow,
            SourceKind::Github => &self.github,
        }
    }

    pub fn section_mut(&mut self, kind: SourceKind) -> &mut SourceSection {
        match kind {
            SourceKind::StackOverflow => &mut self.stack_overflow,
            SourceKind::InternalStackOverflow => &mut self.internal_stack_overflow,
            SourceKind::Github => &mut self.github,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(id: &str) -> NormalizedIssue {
        NormalizedIssue {
            issue_id: id.into(),
            source: SourceKind::StackOverflow,
            title: "T".into(),
            tags: String::new(),
            sdk: String::new(),
            repository: String::new(),
            url: format!("https://stackoverflow.com/questions/{id}"),
        }
    }

    #[test]
    fn test_issue_block_count_matches_len() {
        let block = IssueBlock::new(vec![issue("1"), issue("2")]);
        assert_eq!(block.count, 2);
        assert_eq!(block.count as usize, block.issues.len());
        assert_eq!(IssueBlock::empty().count, 0);
    }

    #[test]
    fn test_started_template_shape() {
        let now = Utc::now();
        let snap = RunSnapshot::started("8/2/2026, 10:00:00 AM".into(), now);
        assert_eq!(snap.start_instant, Some(now));
        assert!(snap.end_time.is_none());
        assert_eq!(snap.stack_overflow.found.count, 0);
        assert!(snap.github.dev_ops.is_empty());
    }

    #[test]
    fn test_snapshot_serializes_with_section_keys() {
        let snap = RunSnapshot::default();
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("stackOverflow").is_some());
        assert!(json.get("internalStackOverflow").is_some());
        assert!(json.get("github").is_some());
        assert!(json["stackOverflow"].get("newIssues").is_some());
        assert!(json["stackOverflow"].get("devOps").is_some());
    }

    #[test]
    fn test_section_error_marker() {
        let section = SourceSection {
            error: Some(SectionError::new("GitHub: 502 Bad Gateway")),
            ..SourceSection::default()
        };
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["error"]["status"], "error");
        let clean = serde_json::to_value(SourceSection::default()).unwrap();
        assert!(clean.get("error").is_none());
    }
}

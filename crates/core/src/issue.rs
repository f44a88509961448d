//! Normalized issue representation — the pipeline's unit of work.

use serde::{Deserialize, Serialize};

use crate::error::Service;

/// The three polled issue sources, in their fixed processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    StackOverflow,
    InternalStackOverflow,
    Github,
}

impl SourceKind {
    /// Fixed per-job processing order (no parallelism across sources).
    pub const ORDERED: [SourceKind; 3] = [
        SourceKind::StackOverflow,
        SourceKind::InternalStackOverflow,
        SourceKind::Github,
    ];

    /// Key of this source's section in the persisted run snapshot.
    pub fn section_key(&self) -> &'static str {
        match self {
            Self::StackOverflow => "stackOverflow",
            Self::InternalStackOverflow => "internalStackOverflow",
            Self::Github => "github",
        }
    }

    pub fn label(&self) -> &'static str {
        self.service().label()
    }

    pub fn service(&self) -> Service {
        match self {
            Self::StackOverflow => Service::StackOverflow,
            Self::InternalStackOverflow => Service::InternalStackOverflow,
            Self::Github => Service::Github,
        }
    }

    /// Noun used in terminal report messages ("posts" for the question
    /// boards, "issues" for the source-control tracker).
    pub fn item_noun(&self) -> &'static str {
        match self {
            Self::StackOverflow | Self::InternalStackOverflow => "posts",
            Self::Github => "issues",
        }
    }
}

/// A source record after normalization: deduplicated, title-truncated,
/// with derived tags/SDK and a canonical URL. Lives for one reconciler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIssue {
    /// Identifier assigned by the upstream source, preserved as-is.
    pub issue_id: String,
    pub source: SourceKind,
    pub title: String,
    /// Derived flag string, e.g. `[Support Labelled]`; empty when none apply.
    #[serde(default)]
    pub tags: String,
    /// SDK derived from the repository name; `(Unknown)` when unmapped.
    #[serde(default)]
    pub sdk: String,
    /// Lowercased repository short-name, when applicable.
    #[serde(default)]
    pub repository: String,
    pub url: String,
}

/// A work item returned by the tracker that shares an upstream issue's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemMatch {
    pub work_item_id: i64,
    /// The tracker's stored `System.Title`.
    pub title: String,
    pub devops_url: String,
    /// The originating upstream issue id and URL.
    pub issue_id: String,
    pub issue_url: String,
}

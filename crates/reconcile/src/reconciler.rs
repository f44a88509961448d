//! Per-source reconcilers.
//!
//! Each reconciler drives one source through fetch → normalize →
//! mirror-lookup → diff → create, writing snapshot sections as they
//! complete. The cancel token is observed before every outbound request
//! and between loop iterations; an observed cancel surfaces as a
//! `Cancelled` error the job runner recognizes.
//!
//! Errors never panic across this boundary: a reconciler returns either a
//! terminal [`SourceReport`] or an [`UpstreamError`] attributed to the
//! upstream that actually failed (tracker failures keep the tracker's
//! label even when raised mid-way through a question-board run).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spiegel_clients::{AzureDevOpsClient, GithubClient, StackOverflowClient};
use spiegel_core::{ErrorKind, IssueBlock, NormalizedIssue, SourceKind, UpstreamError, WorkItemMatch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::normalize;
use crate::sink::SnapshotSink;

/// Politeness delay before each public question-board tag fetch.
pub const PUBLIC_QUESTION_PACE: Duration = Duration::from_millis(1500);
/// Politeness delay before each internal question-board tag fetch.
pub const INTERNAL_QUESTION_PACE: Duration = Duration::from_millis(1000);
/// Politeness delay before each repository fetch.
pub const REPO_PACE: Duration = Duration::from_millis(300);
/// Back-off after a throttled repository fetch before moving on.
pub const REPO_THROTTLE_BACKOFF: Duration = Duration::from_millis(5100);

/// Callback invoked with a human-readable unit name before each upstream
/// unit of work (per tag, per repository).
pub type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

/// One repository to sweep, with an optional label restriction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubRepoSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub excluded_labels: Vec<String>,
}

/// Terminal report of one source run, surfaced in the job result map.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_create: Option<Value>,
}

impl SourceReport {
    fn none_found(kind: SourceKind) -> Self {
        Self {
            status: 204,
            message: format!("No new {} found.", kind.item_noun()),
            last_create: None,
        }
    }

    fn nothing_to_add(kind: SourceKind) -> Self {
        Self {
            status: 204,
            message: format!("No new {} to add", kind.item_noun()),
            last_create: None,
        }
    }

    fn report_only(count: u32) -> Self {
        Self {
            status: 200,
            message: format!("{count} new issue(s) found but not pushed"),
            last_create: None,
        }
    }

    fn created(count: u32, last_create: Option<Value>) -> Self {
        Self {
            status: 200,
            message: format!("{count} new issue(s) created"),
            last_create,
        }
    }
}

fn checkpoint(kind: SourceKind, cancel: &CancellationToken) -> Result<(), UpstreamError> {
    if cancel.is_cancelled() {
        Err(UpstreamError::cancelled(kind.service()))
    } else {
        Ok(())
    }
}

fn sink_err(kind: SourceKind, e: anyhow::Error) -> UpstreamError {
    UpstreamError::internal(kind.service(), format!("snapshot write failed: {e}"))
}

// ── Question boards ───────────────────────────────────────────

pub struct QuestionBoardReconciler {
    pub kind: SourceKind,
    pub client: StackOverflowClient,
    pub tracker: AzureDevOpsClient,
    pub tags: Vec<String>,
    pub from_unix: i64,
    pub push_to_tracker: bool,
    pub pace: Duration,
    pub sink: Arc<dyn SnapshotSink>,
    pub progress: ProgressFn,
    pub cancel: CancellationToken,
}

impl QuestionBoardReconciler {
    pub async fn run(&self) -> Result<SourceReport, UpstreamError> {
        let mut raw = Vec::new();
        for tag in &self.tags {
            checkpoint(self.kind, &self.cancel)?;
            (self.progress)(&format!("{}: {}", self.kind.label(), tag));
            tokio::time::sleep(self.pace).await;
            checkpoint(self.kind, &self.cancel)?;
            let page = self
                .client
                .fetch_questions(tag, self.from_unix, &self.cancel)
                .await?;
            raw.extend(page);
        }

        let issues = normalize::normalize_questions(self.kind, raw, |id| self.client.question_url(id));
        info!(source = self.kind.label(), found = issues.len(), "fetch complete");

        reconcile_with_tracker(
            self.kind,
            &self.tracker,
            self.sink.as_ref(),
            &self.cancel,
            self.push_to_tracker,
            issues,
        )
        .await
    }
}

// ── GitHub ────────────────────────────────────────────────────

pub struct GithubReconciler {
    pub client: GithubClient,
    pub tracker: AzureDevOpsClient,
    pub org: String,
    pub repositories: Vec<GithubRepoSpec>,
    pub created_after_iso: String,
    /// Instant of the previous run, for the label-event filter.
    pub last_run: DateTime<Utc>,
    pub push_to_tracker: bool,
    pub pace: Duration,
    pub throttle_backoff: Duration,
    pub sink: Arc<dyn SnapshotSink>,
    pub progress: ProgressFn,
    pub cancel: CancellationToken,
}

impl GithubReconciler {
    pub async fn run(&self) -> Result<SourceReport, UpstreamError> {
        let kind = SourceKind::Github;
        let mut collected = Vec::new();

        for repo in &self.repositories {
            checkpoint(kind, &self.cancel)?;
            (self.progress)(&format!("GitHub: {}", repo.name));
            tokio::time::sleep(self.pace).await;
            checkpoint(kind, &self.cancel)?;

            let result = self
                .client
                .search_issues(
                    &self.org,
                    &repo.name,
                    repo.label.as_deref(),
                    &self.created_after_iso,
                    &repo.excluded_labels,
                    &self.cancel,
                )
                .await;

            match result {
                Ok(mut issues) => {
                    if let Some(label) = &repo.label {
                        issues.retain(|issue| {
                            normalize::label_applied_after(issue, label, self.last_run)
                        });
                    }
                    collected.extend(issues);
                }
                Err(e) if e.kind == ErrorKind::Throttled => {
                    // One fixed back-off; the repository yields nothing this
                    // run and the sweep continues.
                    warn!(repo = %repo.name, "throttled; backing off");
                    tokio::time::sleep(self.throttle_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }

        let issues = normalize::normalize_github_issues(collected);
        info!(source = kind.label(), found = issues.len(), "fetch complete");

        reconcile_with_tracker(
            kind,
            &self.tracker,
            self.sink.as_ref(),
            &self.cancel,
            self.push_to_tracker,
            issues,
        )
        .await
    }
}

// ── Shared mirror-lookup / diff / create phases ───────────────

async fn reconcile_with_tracker(
    kind: SourceKind,
    tracker: &AzureDevOpsClient,
    sink: &dyn SnapshotSink,
    cancel: &CancellationToken,
    push_to_tracker: bool,
    issues: Vec<NormalizedIssue>,
) -> Result<SourceReport, UpstreamError> {
    let found = IssueBlock::new(issues);
    sink.write_found(kind, &found)
        .await
        .map_err(|e| sink_err(kind, e))?;

    if found.count == 0 {
        return Ok(SourceReport::none_found(kind));
    }

    let mut matches: Vec<WorkItemMatch> = Vec::new();
    let mut new_issues: Vec<NormalizedIssue> = Vec::new();

    for issue in &found.issues {
        checkpoint(kind, cancel)?;
        let refs = tracker
            .search_work_item_by_issue_id(&issue.issue_id, cancel)
            .await?;

        match refs.into_iter().next() {
            None => new_issues.push(issue.clone()),
            Some(item_ref) => {
                checkpoint(kind, cancel)?;
                let detail = tracker.get_work_item_by_url(&item_ref.url, cancel).await?;
                let stored_title = detail.field_str("System.Title").to_string();
                let title_unchanged = stored_title == issue.title;
                matches.push(WorkItemMatch {
                    work_item_id: detail.id,
                    title: stored_title,
                    devops_url: detail.url.clone().unwrap_or(item_ref.url),
                    issue_id: issue.issue_id.clone(),
                    issue_url: issue.url.clone(),
                });
                // A retitled upstream issue counts as new even though its
                // id already exists in the tracker.
                if !title_unchanged {
                    new_issues.push(issue.clone());
                }
            }
        }
    }

    sink.write_matches(kind, &matches)
        .await
        .map_err(|e| sink_err(kind, e))?;
    let new_block = IssueBlock::new(new_issues);
    sink.write_new(kind, &new_block)
        .await
        .map_err(|e| sink_err(kind, e))?;

    if new_block.count == 0 {
        return Ok(SourceReport::nothing_to_add(kind));
    }
    if !push_to_tracker {
        info!(source = kind.label(), new = new_block.count, "push disabled; report only");
        return Ok(SourceReport::report_only(new_block.count));
    }

    let mut last_create = None;
    for issue in &new_block.issues {
        checkpoint(kind, cancel)?;
        last_create = Some(tracker.add_work_item(issue, cancel).await?);
    }
    info!(source = kind.label(), created = new_block.count, "work items created");

    Ok(SourceReport::created(new_block.count, last_create))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use spiegel_core::RunSnapshot;
    use std::sync::Mutex;

    /// In-memory sink capturing section writes for assertions.
    #[derive(Default)]
    struct MemorySink {
        snapshot: Mutex<RunSnapshot>,
    }

    impl MemorySink {
        fn section(&self, kind: SourceKind) -> spiegel_core::SourceSection {
            self.snapshot.lock().unwrap().section(kind).clone()
        }
    }

    #[async_trait::async_trait]
    impl SnapshotSink for MemorySink {
        async fn write_found(&self, kind: SourceKind, block: &IssueBlock) -> anyhow::Result<()> {
            self.snapshot.lock().unwrap().section_mut(kind).found = block.clone();
            Ok(())
        }

        async fn write_matches(
            &self,
            kind: SourceKind,
            matches: &[WorkItemMatch],
        ) -> anyhow::Result<()> {
            self.snapshot.lock().unwrap().section_mut(kind).dev_ops = matches.to_vec();
            Ok(())
        }

        async fn write_new(&self, kind: SourceKind, block: &IssueBlock) -> anyhow::Result<()> {
            self.snapshot.lock().unwrap().section_mut(kind).new_issues = block.clone();
            Ok(())
        }

        async fn write_error(&self, kind: SourceKind, message: &str) -> anyhow::Result<()> {
            self.snapshot.lock().unwrap().section_mut(kind).error =
                Some(spiegel_core::SectionError::new(message));
            Ok(())
        }
    }

    fn noop_progress() -> ProgressFn {
        Arc::new(|_: &str| {})
    }

    fn tracker_for(server: &MockServer) -> AzureDevOpsClient {
        AzureDevOpsClient::new(server.base_url(), "org", "project", "7.0", "", "pat")
    }

    fn board_reconciler(
        board: &MockServer,
        tracker: &MockServer,
        push: bool,
        cancel: CancellationToken,
    ) -> QuestionBoardReconciler {
        QuestionBoardReconciler {
            kind: SourceKind::StackOverflow,
            client: StackOverflowClient::public(board.base_url(), "https://stackoverflow.com")
                .with_throttle_backoff(Duration::from_millis(10)),
            tracker: tracker_for(tracker),
            tags: vec!["sentry".to_string()],
            from_unix: 0,
            push_to_tracker: push,
            pace: Duration::ZERO,
            sink: Arc::new(MemorySink::default()),
            progress: noop_progress(),
            cancel,
        }
    }

    fn mock_questions(server: &MockServer, items: serde_json::Value) {
        server.mock(|when, then| {
            when.method(GET).path("/questions");
            then.status(200).json_body(serde_json::json!({ "items": items }));
        });
    }

    fn mock_wiql(server: &MockServer, work_items: serde_json::Value) {
        server.mock(|when, then| {
            when.method(POST).path("/org/project/_apis/wit/wiql");
            then.status(200)
                .json_body(serde_json::json!({ "workItems": work_items }));
        });
    }

    #[tokio::test]
    async fn test_empty_source_reports_none_found() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(&board, serde_json::json!([]));

        let sink = Arc::new(MemorySink::default());
        let mut r = board_reconciler(&board, &tracker, true, CancellationToken::new());
        r.sink = sink.clone();

        let report = r.run().await.unwrap();
        assert_eq!(report.status, 204);
        assert_eq!(report.message, "No new posts found.");
        assert_eq!(sink.section(SourceKind::StackOverflow).found.count, 0);
    }

    #[tokio::test]
    async fn test_new_question_creates_work_item() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(
            &board,
            serde_json::json!([{ "question_id": 12345, "title": "T", "body": "B" }]),
        );
        mock_wiql(&tracker, serde_json::json!([]));
        let create = tracker.mock(|when, then| {
            when.method(POST)
                .path("/org/project/_apis/wit/workitems/$Issue")
                .body_contains("\"12345\"")
                .body_contains("System.Title");
            then.status(200).json_body(serde_json::json!({ "id": 1 }));
        });

        let sink = Arc::new(MemorySink::default());
        let mut r = board_reconciler(&board, &tracker, true, CancellationToken::new());
        r.sink = sink.clone();

        let report = r.run().await.unwrap();
        create.assert_hits(1);
        assert_eq!(report.status, 200);
        assert_eq!(report.last_create.unwrap()["id"], 1);

        let section = sink.section(SourceKind::StackOverflow);
        assert_eq!(section.found.count, 1);
        assert!(section.dev_ops.is_empty());
        assert_eq!(section.new_issues.count, 1);
    }

    #[tokio::test]
    async fn test_title_match_suppresses_create() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(
            &board,
            serde_json::json!([{ "question_id": 999, "title": "Existing" }]),
        );
        mock_wiql(
            &tracker,
            serde_json::json!([{ "id": 1, "url": format!("{}/wi/1", tracker.base_url()) }]),
        );
        tracker.mock(|when, then| {
            when.method(GET).path("/wi/1");
            then.status(200).json_body(serde_json::json!({
                "id": 1,
                "fields": { "Custom.IssueID": "999", "System.Title": "Existing" }
            }));
        });
        let create = tracker.mock(|when, then| {
            when.method(POST).path("/org/project/_apis/wit/workitems/$Issue");
            then.status(200).json_body(serde_json::json!({ "id": 2 }));
        });

        let sink = Arc::new(MemorySink::default());
        let mut r = board_reconciler(&board, &tracker, true, CancellationToken::new());
        r.sink = sink.clone();

        let report = r.run().await.unwrap();
        create.assert_hits(0);
        assert_eq!(report.status, 204);
        assert_eq!(report.message, "No new posts to add");

        let section = sink.section(SourceKind::StackOverflow);
        assert_eq!(section.new_issues.count, 0);
        assert_eq!(section.dev_ops.len(), 1);
        assert_eq!(section.dev_ops[0].title, "Existing");
    }

    #[tokio::test]
    async fn test_title_drift_triggers_create() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(
            &board,
            serde_json::json!([{ "question_id": 999, "title": "Existing" }]),
        );
        mock_wiql(
            &tracker,
            serde_json::json!([{ "id": 1, "url": format!("{}/wi/1", tracker.base_url()) }]),
        );
        tracker.mock(|when, then| {
            when.method(GET).path("/wi/1");
            then.status(200).json_body(serde_json::json!({
                "id": 1,
                "fields": { "Custom.IssueID": "999", "System.Title": "Different" }
            }));
        });
        let create = tracker.mock(|when, then| {
            when.method(POST).path("/org/project/_apis/wit/workitems/$Issue");
            then.status(200).json_body(serde_json::json!({ "id": 2 }));
        });

        let sink = Arc::new(MemorySink::default());
        let mut r = board_reconciler(&board, &tracker, true, CancellationToken::new());
        r.sink = sink.clone();

        let report = r.run().await.unwrap();
        create.assert_hits(1);
        assert_eq!(report.status, 200);

        let section = sink.section(SourceKind::StackOverflow);
        assert_eq!(section.new_issues.count, 1);
        assert_eq!(section.dev_ops.len(), 1);
    }

    #[tokio::test]
    async fn test_push_disabled_reports_only() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(
            &board,
            serde_json::json!([{ "question_id": 7, "title": "T" }]),
        );
        mock_wiql(&tracker, serde_json::json!([]));
        let create = tracker.mock(|when, then| {
            when.method(POST).path("/org/project/_apis/wit/workitems/$Issue");
            then.status(200).json_body(serde_json::json!({ "id": 9 }));
        });

        let r = board_reconciler(&board, &tracker, false, CancellationToken::new());
        let report = r.run().await.unwrap();
        create.assert_hits(0);
        assert_eq!(report.status, 200);
        assert_eq!(report.message, "1 new issue(s) found but not pushed");
    }

    #[tokio::test]
    async fn test_cancel_before_lookup_stops_run() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(
            &board,
            serde_json::json!([{ "question_id": 7, "title": "T" }]),
        );
        // Slow lookup so the cancel lands while it is in flight.
        let wiql = tracker.mock(|when, then| {
            when.method(POST).path("/org/project/_apis/wit/wiql");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(serde_json::json!({ "workItems": [] }));
        });

        let cancel = CancellationToken::new();
        let sink = Arc::new(MemorySink::default());
        let mut r = board_reconciler(&board, &tracker, true, cancel.clone());
        r.sink = sink.clone();

        // Cancel as soon as the found section lands, before any lookup.
        let sink2 = sink.clone();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            loop {
                if sink2.section(SourceKind::StackOverflow).found.count > 0 {
                    cancel2.cancel();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let err = r.run().await.unwrap_err();
        assert!(err.is_cancelled());
        // The lookup may or may not have started before the cancel landed,
        // but no create was ever issued.
        assert!(wiql.hits() <= 1);
        assert_eq!(sink.section(SourceKind::StackOverflow).new_issues.count, 0);
    }

    #[tokio::test]
    async fn test_tracker_error_keeps_tracker_attribution() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(
            &board,
            serde_json::json!([{ "question_id": 7, "title": "T" }]),
        );
        tracker.mock(|when, then| {
            when.method(POST).path("/org/project/_apis/wit/wiql");
            then.status(401);
        });

        let r = board_reconciler(&board, &tracker, true, CancellationToken::new());
        let err = r.run().await.unwrap_err();
        assert_eq!(err.service, spiegel_core::Service::AzureDevOps);
        assert_eq!(err.kind, ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_github_throttle_then_success() {
        let github = MockServer::start();
        let tracker = MockServer::start();

        // First repo throttled, second returns one support-labelled issue.
        github.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("sentry-cocoa");
            then.status(429);
        });
        github.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("sentry-java");
            then.status(200).json_body(serde_json::json!({
                "data": { "search": { "nodes": [{
                    "number": 5,
                    "title": "Crash",
                    "url": "https://github.com/getsentry/sentry-java/issues/5",
                    "createdAt": "2026-08-01T12:00:00Z",
                    "repository": { "name": "sentry-java" },
                    "labels": { "nodes": [{ "name": "support" }] },
                    "timelineItems": { "nodes": [
                        { "createdAt": "2026-08-01T13:00:00Z", "label": { "name": "support" } }
                    ]}
                }]}}
            }));
        });
        mock_wiql(&tracker, serde_json::json!([]));
        let create = tracker.mock(|when, then| {
            when.method(POST)
                .path("/org/project/_apis/wit/workitems/$Issue")
                .body_contains("[Support Labelled]")
                .body_contains("Java");
            then.status(200).json_body(serde_json::json!({ "id": 3 }));
        });

        let sink = Arc::new(MemorySink::default());
        let r = GithubReconciler {
            client: GithubClient::new(format!("{}/graphql", github.base_url()), "tok"),
            tracker: tracker_for(&tracker),
            org: "getsentry".into(),
            repositories: vec![
                GithubRepoSpec {
                    name: "sentry-cocoa".into(),
                    label: None,
                    excluded_labels: vec![],
                },
                GithubRepoSpec {
                    name: "sentry-java".into(),
                    label: Some("support".into()),
                    excluded_labels: vec![],
                },
            ],
            created_after_iso: "2026-08-01T00:00:00Z".into(),
            last_run: chrono::DateTime::parse_from_rfc3339("2026-08-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            push_to_tracker: true,
            pace: Duration::ZERO,
            throttle_backoff: Duration::from_millis(10),
            sink: sink.clone(),
            progress: noop_progress(),
            cancel: CancellationToken::new(),
        };

        let report = r.run().await.unwrap();
        create.assert_hits(1);
        assert_eq!(report.status, 200);
        let section = sink.section(SourceKind::Github);
        assert_eq!(section.new_issues.count, 1);
        assert_eq!(section.new_issues.issues[0].tags, "[Support Labelled]");
        assert_eq!(section.new_issues.issues[0].sdk, "Java");
    }

    #[tokio::test]
    async fn test_progress_reports_each_unit() {
        let board = MockServer::start();
        let tracker = MockServer::start();
        mock_questions(&board, serde_json::json!([]));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut r = board_reconciler(&board, &tracker, true, CancellationToken::new());
        r.tags = vec!["sentry".into(), "raven".into()];
        r.progress = Arc::new(move |unit: &str| seen2.lock().unwrap().push(unit.to_string()));

        r.run().await.unwrap();
        let units = seen.lock().unwrap();
        assert_eq!(*units, vec!["Stack Overflow: sentry", "Stack Overflow: raven"]);
    }
}

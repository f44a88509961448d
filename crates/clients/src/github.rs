//! GitHub issue-search client over the GraphQL endpoint.
//!
//! One `POST /graphql` per (repository, label) pair. The search requests
//! `last: 100` and does not paginate; results beyond the ceiling drop the
//! oldest items. Throttling is not absorbed here (the reconciler owns the
//! back-off for this source).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use spiegel_core::{Service, UpstreamError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::classify_status;
use crate::http::{parse_json, send_with_cancel};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

const SEARCH_QUERY: &str = r#"query($q: String!) {
  search(query: $q, type: ISSUE, last: 100) {
    nodes {
      ... on Issue {
        number
        title
        url
        createdAt
        repository { name }
        labels(first: 20) { nodes { name } }
        timelineItems(itemTypes: [LABELED_EVENT], first: 50) {
          nodes {
            ... on LabeledEvent { createdAt label { name } }
          }
        }
      }
    }
  }
}"#;

const VALIDATE_QUERY: &str = "query { viewer { login } }";

/// A labeling event from the issue's timeline, used to re-check when a
/// label was actually applied (the `created:` search filter is only
/// day-granular).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEvent {
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// One open issue returned by the search.
#[derive(Debug, Clone)]
pub struct GithubIssue {
    pub number: i64,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub repository: String,
    pub labels: Vec<String>,
    pub label_events: Vec<LabelEvent>,
}

pub struct GithubClient {
    client: reqwest::Client,
    graphql_url: String,
    token: String,
}

impl GithubClient {
    pub fn new(graphql_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            graphql_url: graphql_url.into(),
            token: token.into(),
        }
    }

    /// Search open issues in `org/repo` created after `created_after_iso`,
    /// optionally restricted to `label` and excluding `excluded_labels`.
    pub async fn search_issues(
        &self,
        org: &str,
        repo: &str,
        label: Option<&str>,
        created_after_iso: &str,
        excluded_labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<GithubIssue>, UpstreamError> {
        let search = build_search_string(org, repo, label, created_after_iso, excluded_labels);
        debug!(search = %search, "github issue search");

        let request = self
            .client
            .post(&self.graphql_url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, "spiegel (github)")
            .json(&json!({ "query": SEARCH_QUERY, "variables": { "q": search } }));

        let response = send_with_cancel(Service::Github, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Service::Github, status, &body));
        }

        let parsed: GraphQlResponse = parse_json(Service::Github, response).await?;
        if let Some(errors) = parsed.errors {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(UpstreamError::malformed(
                Service::Github,
                format!("GraphQL errors: {}", messages.join("; ")),
            ));
        }
        let data = parsed.data.ok_or_else(|| {
            UpstreamError::malformed(Service::Github, "GraphQL response missing data")
        })?;

        Ok(data.search.nodes.into_iter().map(IssueNode::into_issue).collect())
    }

    /// Minimal authenticated probe (`viewer { login }`).
    pub async fn validate(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        let request = self
            .client
            .post(&self.graphql_url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, "spiegel (github)")
            .timeout(VALIDATE_TIMEOUT)
            .json(&json!({ "query": VALIDATE_QUERY }));

        let response = send_with_cancel(Service::Github, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Service::Github, status, &body));
        }
        Ok(())
    }
}

/// Build the `search(query:)` operand.
fn build_search_string(
    org: &str,
    repo: &str,
    label: Option<&str>,
    created_after_iso: &str,
    excluded_labels: &[String],
) -> String {
    let mut parts = vec![format!("repo:{org}/{repo}"), "is:open".into(), "is:issue".into()];
    if let Some(label) = label {
        parts.push(format!("label:\"{label}\""));
    }
    parts.push(format!("created:>{created_after_iso}"));
    for excluded in excluded_labels {
        parts.push(format!("-label:{excluded}"));
    }
    parts.join(" ")
}

// ── Wire shapes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<SearchData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: SearchNodes,
}

#[derive(Debug, Deserialize)]
struct SearchNodes {
    #[serde(default)]
    nodes: Vec<IssueNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    number: i64,
    title: String,
    url: String,
    created_at: DateTime<Utc>,
    repository: RepositoryName,
    #[serde(default)]
    labels: LabelNodes,
    #[serde(default)]
    timeline_items: TimelineNodes,
}

impl IssueNode {
    fn into_issue(self) -> GithubIssue {
        GithubIssue {
            number: self.number,
            title: self.title,
            url: self.url,
            created_at: self.created_at,
            repository: self.repository.name,
            labels: self.labels.nodes.into_iter().map(|l| l.name).collect(),
            label_events: self
                .timeline_items
                .nodes
                .into_iter()
                .filter_map(|n| match (n.label, n.created_at) {
                    (Some(label), Some(created_at)) => Some(LabelEvent {
                        label: label.name,
                        created_at,
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryName {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct LabelNodes {
    #[serde(default)]
    nodes: Vec<LabelName>,
}

#[derive(Debug, Deserialize)]
struct LabelName {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineNodes {
    #[serde(default)]
    nodes: Vec<TimelineNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineNode {
    created_at: Option<DateTime<Utc>>,
    label: Option<LabelName>,
}

//! Azure DevOps work-item tracker client.
//!
//! Three operations back the reconciler's mirror-lookup and create phases:
//! a WIQL search by the custom issue-id field, a follow-up GET on the
//! tracker-supplied work-item URL (used verbatim), and a JSON-Patch create
//! against the `$Issue` type. Credential validation probes
//! `/_apis/projects?$top=1`.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use spiegel_core::{NormalizedIssue, Service, UpstreamError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::classify_status;
use crate::http::{parse_json, send_with_cancel};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// A work-item reference from a WIQL query (`id` + per-item URL).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemRef {
    pub id: i64,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems", default)]
    work_items: Vec<WorkItemRef>,
}

/// Full work item as returned by the per-item URL.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemDetail {
    pub id: i64,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(default)]
    pub url: Option<String>,
}

impl WorkItemDetail {
    /// String field accessor; absent or non-string fields read as empty.
    pub fn field_str(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

pub struct AzureDevOpsClient {
    client: reqwest::Client,
    base_url: String,
    org: String,
    project: String,
    api_version: String,
    username: String,
    pat: String,
}

impl AzureDevOpsClient {
    pub fn new(
        base_url: impl Into<String>,
        org: impl Into<String>,
        project: impl Into<String>,
        api_version: impl Into<String>,
        username: impl Into<String>,
        pat: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            org: org.into(),
            project: project.into(),
            api_version: api_version.into(),
            username: username.into(),
            pat: pat.into(),
        }
    }

    /// `Basic base64(username:token)`; the username may be empty.
    fn auth_header(&self) -> String {
        format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", self.username, self.pat))
        )
    }

    fn project_api(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/_apis/{}",
            self.base_url, self.org, self.project, path
        )
    }

    /// WIQL search for work items whose `Custom.IssueID` equals `issue_id`.
    pub async fn search_work_item_by_issue_id(
        &self,
        issue_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkItemRef>, UpstreamError> {
        let wiql = format!(
            "SELECT [System.Id],[System.Title],[System.State],[System.AssignedTo] \
             FROM workitems WHERE [System.WorkItemType] = 'Issue' \
             AND [Custom.IssueID] = '{issue_id}'"
        );
        debug!(issue_id, "work-item lookup");

        let request = self
            .client
            .post(self.project_api("wit/wiql"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("api-version", self.api_version.as_str())])
            .json(&json!({ "query": wiql }));

        let response = send_with_cancel(Service::AzureDevOps, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Service::AzureDevOps, status, &body));
        }

        let parsed: WiqlResponse = parse_json(Service::AzureDevOps, response).await?;
        Ok(parsed.work_items)
    }

    /// Fetch a work item via the tracker-supplied URL, used verbatim.
    pub async fn get_work_item_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<WorkItemDetail, UpstreamError> {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header());

        let response = send_with_cancel(Service::AzureDevOps, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Service::AzureDevOps, status, &body));
        }
        parse_json(Service::AzureDevOps, response).await
    }

    /// Create a work item of type `Issue` from a normalized issue.
    pub async fn add_work_item(
        &self,
        issue: &NormalizedIssue,
        cancel: &CancellationToken,
    ) -> Result<Value, UpstreamError> {
        let request = self
            .client
            .post(self.project_api("wit/workitems/$Issue"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json-patch+json")
            .query(&[("api-version", self.api_version.as_str())])
            .json(&patch_document(issue));

        let response = send_with_cancel(Service::AzureDevOps, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Service::AzureDevOps, status, &body));
        }
        parse_json(Service::AzureDevOps, response).await
    }

    /// Minimal authenticated probe (`GET /_apis/projects?$top=1`).
    pub async fn validate(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        let request = self
            .client
            .get(format!("{}/{}/_apis/projects", self.base_url, self.org))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("$top", "1"), ("api-version", self.api_version.as_str())])
            .timeout(VALIDATE_TIMEOUT);

        let response = send_with_cancel(Service::AzureDevOps, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Service::AzureDevOps, status, &body));
        }
        Ok(())
    }
}

/// JSON-Patch document mapping the normalized issue onto tracker fields.
fn patch_document(issue: &NormalizedIssue) -> Vec<Value> {
    let fields = [
        ("System.Title", issue.title.as_str()),
        ("System.Tags", issue.tags.as_str()),
        ("Custom.IssueID", issue.issue_id.as_str()),
        ("Custom.IssueType", issue.source.label()),
        ("Custom.SDK", issue.sdk.as_str()),
        ("Custom.Repository", issue.repository.as_str()),
        ("Custom.IssueURL", issue.url.as_str()),
    ];
    fields
        .iter()
        .map(|(key, value)| {
            json!({
                "op": "add",
                "path": format!("/fields/{key}"),
                "from": null,
                "value": value,
            })
        })
        .collect()
}

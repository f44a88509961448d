//! HTTP clients for the external systems spiegel reconciles against:
//! the public and internal question boards, the GitHub GraphQL issue
//! search, and the Azure DevOps work-item tracker.
//!
//! Each client issues exactly one HTTP request per operation and maps
//! failures through the shared classifier in [`classify`]. Cancellation is
//! threaded as a `CancellationToken` into every request so in-flight calls
//! abort promptly.

pub mod azure_devops;
pub mod classify;
pub mod github;
mod http;
pub mod stack_overflow;

use serde::Serialize;
use spiegel_core::UpstreamError;

pub use azure_devops::{AzureDevOpsClient, WorkItemDetail, WorkItemRef};
pub use github::{GithubClient, GithubIssue, LabelEvent};
pub use stack_overflow::{Question, StackOverflowClient};

/// Result of a credential-validation probe, serialized for the control
/// plane's `/api/validate/*` endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
        }
    }
}

impl From<Result<(), UpstreamError>> for ValidationOutcome {
    fn from(result: Result<(), UpstreamError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which external system an error is attributed to.
///
/// Attribution follows the system that actually failed, not the pipeline
/// that was running: a work-item tracker failure during a Stack Overflow
/// run still carries [`Service::AzureDevOps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    StackOverflow,
    InternalStackOverflow,
    Github,
    AzureDevOps,
}

impl Service {
    pub fn label(&self) -> &'static str {
        match self {
            Self::StackOverflow => "Stack Overflow",
            Self::InternalStackOverflow => "Internal Stack Overflow",
            Self::Github => "GitHub",
            Self::AzureDevOps => "Azure DevOps",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Error categories shared by every upstream client and reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Cancellation observed at a checkpoint.
    Cancelled,
    /// DNS or connection failure.
    Unavailable,
    /// 401 or 403 from the upstream.
    Auth,
    /// 404 of an addressable resource.
    NotFound,
    /// 429 from the upstream.
    Throttled,
    /// 2xx with a schema-invalid body.
    Malformed,
    /// Other 4xx/5xx.
    Server,
    /// Required secret missing, org/project blank, token empty.
    Configuration,
    /// Invariant violation; never user-caused.
    Internal,
}

/// The single error currency between clients, reconcilers and the job
/// runner. Carries the attributed service so the control plane can surface
/// the failing upstream by name.
#[derive(Debug, Clone, Error)]
#[error("{service}: {message}")]
pub struct UpstreamError {
    pub service: Service,
    pub kind: ErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(service: Service, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            service,
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled(service: Service) -> Self {
        Self::new(service, ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn configuration(service: Service, message: impl Into<String>) -> Self {
        Self::new(service, ErrorKind::Configuration, message)
    }

    pub fn malformed(service: Service, message: impl Into<String>) -> Self {
        Self::new(service, ErrorKind::Malformed, message)
    }

    pub fn internal(service: Service, message: impl Into<String>) -> Self {
        Self::new(service, ErrorKind::Internal, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

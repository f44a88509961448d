pub mod config;
pub mod error;
pub mod issue;
pub mod snapshot;
pub mod window;

pub use config::Config;
pub use error::{ErrorKind, Service, UpstreamError};
pub use issue::{NormalizedIssue, SourceKind, WorkItemMatch};
pub use snapshot::{IssueBlock, RunSnapshot, SectionError, SourceSection};
pub use window::QueryWindow;

//! Mapping of source-specific records into the uniform internal issue
//! representation: deduplication, title truncation, tag/SDK derivation and
//! the label-event filter.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use spiegel_clients::{GithubIssue, Question};
use spiegel_core::{NormalizedIssue, SourceKind};

/// Maximum title length in Unicode scalar values. No HTML escaping happens
/// here; the presentation layer owns escaping.
pub const MAX_TITLE_CODE_POINTS: usize = 255;

/// Tag written to `System.Tags` when a support label is present.
pub const SUPPORT_TAG: &str = "[Support Labelled]";

/// Collapse duplicates, keeping the first occurrence in input order.
pub fn dedup_first<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Truncate by code-point count; strings at or under the limit pass
/// through unchanged.
pub fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CODE_POINTS).collect()
}

/// `[Support Labelled]` iff any label lowercases to `support` or
/// `team: support`, else empty.
pub fn support_tag(labels: &[String]) -> String {
    let labelled = labels.iter().any(|label| {
        let lower = label.to_lowercase();
        lower == "support" || lower == "team: support"
    });
    if labelled {
        SUPPORT_TAG.to_string()
    } else {
        String::new()
    }
}

/// SDK display name derived from the repository short-name suffix.
pub fn sdk_for_repository(repository: &str) -> &'static str {
    const SUFFIXES: [(&str, &str); 8] = [
        ("-java", "Java"),
        ("-js", "Node"),
        ("-dotnet", "C#"),
        ("-python", "Python"),
        ("-go", "Go"),
        ("-ruby", "Ruby"),
        ("-php", "PHP"),
        ("-rust", "Rust"),
    ];
    let lower = repository.to_lowercase();
    for (suffix, sdk) in SUFFIXES {
        if lower.ends_with(suffix) {
            return sdk;
        }
    }
    "(Unknown)"
}

/// Keep an issue iff a labeling event for the queried label exists and was
/// applied strictly after `last_run`. The GraphQL `created:` filter is
/// day-granular and misses labels applied after creation; this restores
/// correctness.
pub fn label_applied_after(issue: &GithubIssue, label: &str, last_run: DateTime<Utc>) -> bool {
    let wanted = label.to_lowercase();
    issue
        .label_events
        .iter()
        .any(|event| event.label.to_lowercase() == wanted && event.created_at > last_run)
}

/// Normalize one question-board fetch: dedup by question id (first
/// occurrence), truncate titles, canonicalize URLs onto the board's web
/// host. Idempotent: feeding two identical payloads yields the same
/// sequence as feeding one.
pub fn normalize_questions<F>(
    kind: SourceKind,
    questions: Vec<Question>,
    question_url: F,
) -> Vec<NormalizedIssue>
where
    F: Fn(i64) -> String,
{
    dedup_first(questions, |q| q.question_id)
        .into_iter()
        .map(|q| NormalizedIssue {
            issue_id: q.question_id.to_string(),
            source: kind,
            title: truncate_title(&q.title),
            tags: String::new(),
            sdk: String::new(),
            repository: String::new(),
            url: question_url(q.question_id),
        })
        .collect()
}

/// Normalize one GitHub sweep: dedup by canonical URL, truncate titles,
/// derive the support tag and SDK, lowercase the repository short-name.
pub fn normalize_github_issues(issues: Vec<GithubIssue>) -> Vec<NormalizedIssue> {
    dedup_first(issues, |i| i.url.clone())
        .into_iter()
        .map(|i| NormalizedIssue {
            issue_id: i.number.to_string(),
            source: SourceKind::Github,
            title: truncate_title(&i.title),
            tags: support_tag(&i.labels),
            sdk: sdk_for_repository(&i.repository).to_string(),
            repository: i.repository.to_lowercase(),
            url: i.url,
        })
        .collect()
}

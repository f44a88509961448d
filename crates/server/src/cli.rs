//! Command-line dispatch for non-serve invocations.
//!
//! `spiegel-server` with no subcommand starts the HTTP control plane;
//! `spiegel-server query [...]` runs a single reconciliation job in the
//! foreground and prints the resulting run snapshot as JSON. Exit code is
//! 0 on success and 1 on any fatal error.

use std::sync::Arc;

use spiegel_core::{Config, SourceKind};
use tracing::info;

use crate::jobs::runner::{spawn_query_job, RunPlan};
use crate::jobs::types::JobStatus;
use crate::state::AppState;

/// Dispatch non-serve subcommands; returns false for `serve`.
pub async fn dispatch(config: &Config, args: &[String]) -> anyhow::Result<bool> {
    match args.get(1).map(String::as_str) {
        Some("query") => {
            run_query_once(config, &args[2..]).await?;
            Ok(true)
        }
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn print_usage() {
    println!("spiegel-server — reconciling issue-ingestion engine");
    println!();
    println!("USAGE:");
    println!("  spiegel-server                 start the HTTP control plane");
    println!("  spiegel-server query [FLAGS]   run one reconciliation job, print the snapshot");
    println!();
    println!("QUERY FLAGS:");
    println!("  --days <N>           polling window in days (1-365)");
    println!("  --hour <H>           window start hour, local time (0-23)");
    println!("  --no-push            classify only; do not create work items");
    println!("  --services <LIST>    comma-separated: stackoverflow,internal,github");
}

/// Parsed `query` subcommand flags; `None` falls back to stored settings.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct QueryArgs {
    pub days: Option<u16>,
    pub hour: Option<u8>,
    pub no_push: bool,
    pub services: Option<Vec<SourceKind>>,
}

pub(crate) fn parse_query_args(args: &[String]) -> anyhow::Result<QueryArgs> {
    let mut parsed = QueryArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--days" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--days requires a value"))?;
                parsed.days = Some(value.parse()?);
            }
            "--hour" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--hour requires a value"))?;
                parsed.hour = Some(value.parse()?);
            }
            "--no-push" => parsed.no_push = true,
            "--services" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--services requires a value"))?;
                let mut services = Vec::new();
                for name in value.split(',').filter(|s| !s.is_empty()) {
                    services.push(parse_service(name)?);
                }
                parsed.services = Some(services);
            }
            other => anyhow::bail!("unknown query flag: {}", other),
        }
    }
    Ok(parsed)
}

fn parse_service(name: &str) -> anyhow::Result<SourceKind> {
    match name.trim().to_lowercase().as_str() {
        "stackoverflow" | "stack-overflow" => Ok(SourceKind::StackOverflow),
        "internal" | "internal-stackoverflow" => Ok(SourceKind::InternalStackOverflow),
        "github" => Ok(SourceKind::Github),
        other => anyhow::bail!(
            "unknown service '{}' (expected stackoverflow, internal, github)",
            other
        ),
    }
}

async fn run_query_once(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let parsed = parse_query_args(args)?;
    let state = Arc::new(AppState::new(config.clone())?);
    let settings = state.settings.load()?;

    let enabled = parsed.services.unwrap_or_else(|| {
        let mut enabled = Vec::new();
        if settings.enabled_services.stack_overflow {
            enabled.push(SourceKind::StackOverflow);
        }
        if settings.enabled_services.internal_stack_overflow {
            enabled.push(SourceKind::InternalStackOverflow);
        }
        if settings.enabled_services.github {
            enabled.push(SourceKind::Github);
        }
        enabled
    });
    let days_back = parsed
        .days
        .unwrap_or(settings.query_defaults.number_of_days_to_query);
    if !(1..=365).contains(&days_back) {
        anyhow::bail!("--days must be within [1, 365]");
    }
    let start_hour = parsed.hour.unwrap_or(settings.query_defaults.start_hour);
    if start_hour > 23 {
        anyhow::bail!("--hour must be within [0, 23]");
    }
    let push_to_tracker = if parsed.no_push {
        false
    } else {
        settings.push_to_dev_ops
    };

    let job = spawn_query_job(
        state.clone(),
        RunPlan {
            enabled,
            days_back,
            start_hour,
            push_to_tracker,
        },
    );
    info!(job_id = %job.id, "running query job to completion");

    while job.status() == JobStatus::Running {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    for error in job.service_errors.read().unwrap().iter() {
        eprintln!("{}: {}", error.service, error.message);
    }

    match job.status() {
        JobStatus::Completed => {
            let snapshot = state.snapshot.read_document()?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        JobStatus::Cancelled => anyhow::bail!("query job was cancelled"),
        JobStatus::Error | JobStatus::Running => {
            let message = job
                .error
                .read()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "query job failed".to_string());
            anyhow::bail!(message)
        }
    }
}

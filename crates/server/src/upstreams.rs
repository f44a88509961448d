//! Upstream client construction from settings + stored secrets.
//!
//! Configuration gaps (blank org/project, missing tokens) surface as
//! `Configuration`-kind errors attributed to the service they belong to,
//! so the control plane reports the right upstream.

use spiegel_clients::{AzureDevOpsClient, GithubClient, StackOverflowClient};
use spiegel_core::{Service, UpstreamError};

use crate::settings_store::Settings;
use crate::state::AppState;

fn required_secret(state: &AppState, key: &str, service: Service) -> Result<String, UpstreamError> {
    match state.secrets.get(key) {
        Ok(Some(value)) if !value.is_empty() => Ok(value),
        Ok(_) => Err(UpstreamError::configuration(
            service,
            format!("secret '{key}' is not set"),
        )),
        Err(e) => Err(UpstreamError::internal(
            service,
            format!("secret store failure: {e}"),
        )),
    }
}

pub fn build_tracker(
    state: &AppState,
    settings: &Settings,
) -> Result<AzureDevOpsClient, UpstreamError> {
    let org = settings.azure_dev_ops.org.trim();
    let project = settings.azure_dev_ops.project.trim();
    if org.is_empty() || project.is_empty() {
        return Err(UpstreamError::configuration(
            Service::AzureDevOps,
            "organization/project not configured",
        ));
    }
    let pat = required_secret(state, "tracker-pat", Service::AzureDevOps)?;
    let username = state
        .secrets
        .get("tracker-username")
        .ok()
        .flatten()
        .unwrap_or_default();
    let api_version = if settings.azure_dev_ops.api_version.is_empty() {
        "7.0".to_string()
    } else {
        settings.azure_dev_ops.api_version.clone()
    };
    Ok(AzureDevOpsClient::new(
        &state.config.upstreams.devops_base,
        org,
        project,
        api_version,
        username,
        pat,
    ))
}

pub fn build_public_board(state: &AppState) -> StackOverflowClient {
    StackOverflowClient::public(
        &state.config.upstreams.stack_overflow_api,
        &state.config.upstreams.stack_overflow_web,
    )
}

pub fn build_internal_board(state: &AppState) -> Result<StackOverflowClient, UpstreamError> {
    let key = required_secret(state, "qa-internal-key", Service::InternalStackOverflow)?;
    Ok(StackOverflowClient::internal(
        &state.config.upstreams.internal_api,
        &state.config.upstreams.internal_web,
        key,
    ))
}

pub fn build_github(state: &AppState, settings: &Settings) -> Result<GithubClient, UpstreamError> {
    let token = required_secret(state, "scm-token", Service::Github)?;
    Ok(GithubClient::new(settings.github.api_url.clone(), token))
}

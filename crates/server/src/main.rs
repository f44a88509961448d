mod api;
mod cli;
mod jobs;
mod router;
mod secret_store;
mod settings_store;
mod snapshot_store;
mod state;
mod store_util;
mod telemetry;
mod upstreams;

use std::sync::Arc;

use tracing::info;

use state::AppState;

/// Initialize shared state and start the HTTP control plane.
async fn serve(config: &spiegel_core::Config) -> anyhow::Result<()> {
    config.log_summary();

    let state = Arc::new(AppState::new(config.clone())?);
    let app = router::build_router(state);

    // Port 0 binds an ephemeral port; log the resolved address.
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("control plane listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    spiegel_core::config::load_dotenv();
    let config = spiegel_core::Config::from_env();

    // `isVerbose` in the settings document widens the log level.
    let verbose = settings_store::SettingsStore::new(&config.storage.data_dir)
        .load()
        .map(|settings| settings.is_verbose)
        .unwrap_or(false);
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Dispatch non-serve subcommands; returns false for `serve`.
    if !cli::dispatch(&config, &args).await? {
        serve(&config).await?;
    }

    Ok(())
}

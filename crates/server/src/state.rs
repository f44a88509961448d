//! Shared application state handed to every handler and job.

use std::sync::Arc;

use spiegel_core::Config;

use crate::jobs::types::QueryJobStore;
use crate::secret_store::SecretStore;
use crate::settings_store::SettingsStore;
use crate::snapshot_store::SnapshotStore;
use crate::telemetry::{LogTelemetry, TelemetrySink};

pub struct AppState {
    pub config: Config,
    pub settings: SettingsStore,
    pub secrets: SecretStore,
    pub snapshot: Arc<SnapshotStore>,
    pub jobs: QueryJobStore,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            settings: SettingsStore::new(data_dir),
            secrets: SecretStore::open(data_dir)?,
            snapshot: Arc::new(SnapshotStore::new(data_dir)),
            jobs: QueryJobStore::new(),
            telemetry: Arc::new(LogTelemetry),
            config,
        })
    }
}

//! Settings document store.
//!
//! One JSON document at `{data_dir}/settings.json`, materialized from
//! defaults on first read. PATCH applies a recursive merge of the partial
//! document; writes are full-file atomic replaces. Reconcilers receive
//! settings by value at job start, so concurrent PATCHes never race a
//! running job's view.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spiegel_reconcile::GithubRepoSpec;

use crate::store_util::write_atomic;

// ── Document shape ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub azure_dev_ops: AzureDevOpsSettings,
    pub github: GithubSettings,
    pub use_test_data: bool,
    pub is_verbose: bool,
    pub enabled_services: EnabledServices,
    pub query_defaults: QueryDefaults,
    pub push_to_dev_ops: bool,
    pub repositories: Repositories,
    pub timestamp: RunTimestamps,
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            azure_dev_ops: AzureDevOpsSettings::default(),
            github: GithubSettings::default(),
            use_test_data: false,
            is_verbose: false,
            enabled_services: EnabledServices::default(),
            query_defaults: QueryDefaults::default(),
            push_to_dev_ops: true,
            repositories: Repositories::default(),
            timestamp: RunTimestamps::default(),
            theme: "light".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureDevOpsSettings {
    pub org: String,
    pub project: String,
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubSettings {
    pub api_url: String,
    pub org: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com/graphql".to_string(),
            org: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnabledServices {
    pub stack_overflow: bool,
    pub internal_stack_overflow: bool,
    pub github: bool,
}

impl Default for EnabledServices {
    fn default() -> Self {
        Self {
            stack_overflow: true,
            internal_stack_overflow: false,
            github: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryDefaults {
    pub number_of_days_to_query: u16,
    pub start_hour: u8,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            number_of_days_to_query: 1,
            start_hour: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Repositories {
    pub github: Vec<GithubRepoSpec>,
    pub stack_overflow: Vec<String>,
    pub internal_stack_overflow: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunTimestamps {
    pub last_run: Option<DateTime<Utc>>,
    pub previous_run: Option<DateTime<Utc>>,
}

// ── Store ─────────────────────────────────────────────────────

pub struct SettingsStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles (PATCH, timestamp roll).
    mutate: Mutex<()>,
}

impl SettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("settings.json"),
            mutate: Mutex::new(()),
        }
    }

    pub fn load(&self) -> anyhow::Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &data)
    }

    /// Apply a partial document and return the updated settings. A patch
    /// that breaks the document's types is rejected without writing.
    pub fn patch(&self, patch: &Value) -> anyhow::Result<Settings> {
        let _guard = self.mutate.lock().unwrap();
        let current = self.load()?;
        let mut doc = serde_json::to_value(&current)?;
        merge_json(&mut doc, patch);
        let updated: Settings = serde_json::from_value(doc)?;
        self.save(&updated)?;
        Ok(updated)
    }

    /// Roll `timestamp.lastRun` forward to `now` at job start. Returns the
    /// updated settings and the previous `lastRun` (now `previousRun`),
    /// which the label-event filter compares against.
    pub fn roll_timestamps(
        &self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(Settings, Option<DateTime<Utc>>)> {
        let _guard = self.mutate.lock().unwrap();
        let mut settings = self.load()?;
        let previous = settings.timestamp.last_run;
        settings.timestamp.previous_run = previous;
        settings.timestamp.last_run = Some(now);
        self.save(&settings)?;
        Ok((settings, previous))
    }
}

/// Recursive object merge; non-object values (including arrays) replace.
fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge_json(existing, patch_value),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

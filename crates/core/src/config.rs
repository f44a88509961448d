use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upstreams: UpstreamConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            storage: StorageConfig::from_env(),
            upstreams: UpstreamConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  server:     host={}, port={}",
            self.server.host,
            self.server.port
        );
        tracing::info!("  storage:    data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  upstreams:  stack_overflow={}, internal={}, devops={}",
            self.upstreams.stack_overflow_api,
            self.upstreams.internal_api,
            self.upstreams.devops_base
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    /// Port 0 binds an ephemeral port; the bound address is logged.
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("SPIEGEL_HOST", "127.0.0.1"),
            port: env_u16("SPIEGEL_PORT", 0),
            cors_origin: env_or("CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
        }
    }
}

// ── Upstream endpoints ────────────────────────────────────────

/// Base URLs of the external systems. The GraphQL endpoint and the
/// tracker's org/project live in the settings document; these hosts are
/// deployment-level and come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub stack_overflow_api: String,
    pub stack_overflow_web: String,
    pub internal_api: String,
    pub internal_web: String,
    pub devops_base: String,
}

impl UpstreamConfig {
    fn from_env() -> Self {
        Self {
            stack_overflow_api: env_or("STACK_OVERFLOW_API_URL", "https://api.stackexchange.com/2.3"),
            stack_overflow_web: env_or("STACK_OVERFLOW_WEB_URL", "https://stackoverflow.com"),
            internal_api: env_or("INTERNAL_STACK_OVERFLOW_API_URL", "https://api.stackoverflowteams.com/2.3"),
            internal_web: env_or("INTERNAL_STACK_OVERFLOW_WEB_URL", "https://stackoverflowteams.com"),
            devops_base: env_or("AZURE_DEVOPS_BASE_URL", "https://dev.azure.com"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or("SPIEGEL_TEST_UNSET_KEY_1", "fallback"), "fallback");
    }

    #[test]
    fn test_env_u16_parses() {
        std::env::set_var("SPIEGEL_TEST_PORT", "8125");
        assert_eq!(env_u16("SPIEGEL_TEST_PORT", 0), 8125);
        std::env::set_var("SPIEGEL_TEST_PORT", "not-a-port");
        assert_eq!(env_u16("SPIEGEL_TEST_PORT", 7), 7);
        std::env::remove_var("SPIEGEL_TEST_PORT");
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origin: "*".into(),
        };
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
    }
}

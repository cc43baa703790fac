//! Runtime configuration, layered from an optional TOML file under
//! environment variable overrides.

use std::path::PathBuf;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Application configuration for a single `fatsd` process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the embedded database and scratch state.
    pub data_dir: PathBuf,
    /// Path to the SQLite database file. Derived from `data_dir` if absent.
    pub db_path: Option<PathBuf>,
    /// Name of the shared Docker network.
    pub network_name: String,
    /// Binary used to talk to the container engine (`docker`, `podman`, ...).
    pub container_engine: String,
    /// Reconciliation interval, in seconds.
    pub reconcile_interval_secs: u64,
    /// Proxy resolution cache TTL, in seconds.
    pub proxy_cache_ttl_secs: u64,
    /// Address the HTTP server listens on.
    pub listen_addr: String,
    /// Release tag of the build-plan generator to fetch when missing.
    pub plan_generator_version: String,
    /// Base name of the build-plan generator binary and its release asset.
    pub plan_generator_bin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/fats"),
            db_path: None,
            network_name: "fats_network".to_string(),
            container_engine: "docker".to_string(),
            reconcile_interval_secs: 180,
            proxy_cache_ttl_secs: 300,
            listen_addr: "0.0.0.0:8080".to_string(),
            plan_generator_version: "v0.15.1".to_string(),
            plan_generator_bin: "railpack".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration, merging (in increasing priority): built-in
    /// defaults, an optional TOML file, then `FATS_*` environment variables.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("FATS_"));

        figment
            .extract()
            .context("Failed to assemble application configuration")
    }

    /// The resolved path to the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("fats.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_used_without_overrides() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.network_name, "fats_network");
        assert_eq!(config.reconcile_interval_secs, 180);
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/fats/fats.db"));
    }
}

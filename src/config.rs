use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BraidConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub gossip: GossipConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    /// Seconds between background sweep passes.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Quota mode applied when the database holds none: light/normal/heavy/max.
    pub default_mode: String,
    /// Hours a thread may stay suspended before archival.
    pub archive_after_hours: i64,
    /// Seconds before a pending capture context is discarded.
    pub pending_context_ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GossipConfig {
    /// Minimum cosine similarity for a direct bridge.
    pub similarity_threshold: f64,
    /// Propagation chains stop at this depth.
    pub max_propagation_depth: u32,
}

impl Default for BraidConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            gossip: GossipConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            sweep_interval_secs: 300,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_braid_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: "normal".into(),
            archive_after_hours: 72,
            pending_context_ttl_secs: 600,
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            max_propagation_depth: 2,
        }
    }
}

/// Returns `~/.braid/`
pub fn default_braid_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".braid")
}

/// Returns the default config file path: `~/.braid/config.toml`
pub fn default_config_path() -> PathBuf {
    default_braid_dir().join("config.toml")
}

impl BraidConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            BraidConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (BRAID_DB, BRAID_MODE, BRAID_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BRAID_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("BRAID_MODE") {
            self.engine.default_mode = val;
        }
        if let Ok(val) = std::env::var("BRAID_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BraidConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.sweep_interval_secs, 300);
        assert_eq!(config.engine.default_mode, "normal");
        assert_eq!(config.engine.archive_after_hours, 72);
        assert_eq!(config.gossip.similarity_threshold, 0.5);
        assert_eq!(config.gossip.max_propagation_depth, 2);
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
sweep_interval_secs = 60

[storage]
db_path = "/tmp/test.db"

[engine]
default_mode = "heavy"
"#;
        let config: BraidConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.sweep_interval_secs, 60);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.engine.default_mode, "heavy");
        // defaults still apply for unset fields
        assert_eq!(config.engine.archive_after_hours, 72);
        assert_eq!(config.gossip.max_propagation_depth, 2);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = BraidConfig::default();
        std::env::set_var("BRAID_DB", "/tmp/override.db");
        std::env::set_var("BRAID_MODE", "max");
        std::env::set_var("BRAID_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.engine.default_mode, "max");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("BRAID_DB");
        std::env::remove_var("BRAID_MODE");
        std::env::remove_var("BRAID_LOG_LEVEL");
    }
}

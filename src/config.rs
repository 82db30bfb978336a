//! Configuration System
//!
//! Layered engine configuration: built-in defaults, then an optional TOML
//! file, then `TREEMOVER__`-prefixed environment variables
//! (`TREEMOVER__MERGE__CONFLICT_POLICY=apply_non_conflicting`).

use crate::error::{EngineError, Result};
use crate::logging::LoggingConfig;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where revisions are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Sled database directory
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    ProjectDirs::from("", "", "treemover")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".treemover/store"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_store_path(),
        }
    }
}

/// What a merge with conflicts does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Commit nothing and report the conflicts as an error.
    #[default]
    Abort,
    /// Commit the non-conflicting actions; conflicts are returned alongside.
    ApplyNonConflicting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Sled && self.storage.path.as_os_str().is_empty() {
            return Err(EngineError::Config("Store path cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to encode config: {}", e)))
    }
}

/// Create a Config builder with the built-in defaults applied.
fn builder_with_defaults() -> std::result::Result<ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("storage.backend", "memory")?
        .set_default("storage.path", default_store_path().to_string_lossy().to_string())?
        .set_default("merge.conflict_policy", "abort")
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, reading `file` (TOML) when given.
    pub fn load(file: Option<&Path>) -> Result<EngineConfig> {
        let mut builder = builder_with_defaults()?;
        if let Some(path) = file {
            if !path.exists() {
                return Err(EngineError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("TREEMOVER").separator("__"));

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(backend = ?config.storage.backend, policy = ?config.merge.conflict_policy, "Loaded configuration");
        Ok(config)
    }
}

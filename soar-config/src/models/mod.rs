pub mod executor;
pub mod runner;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use soar_core::CollectorOptions;
use soar_core::memorizer::{DEFAULT_NAMESPACE, HashStrategy};

use crate::error::ConfigLoadError;
use executor::ExecutorConfig;
use runner::{RunnerConfig, RunnerKind};

/// Effective configuration for one `soarctl` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorConfig,
    /// Caching is off when the table is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memorizer: Option<MemorizerConfig>,
    pub collector: CollectorConfig,
    pub runners: Vec<RunnerConfig>,
}

impl Config {
    /// Checks what serde cannot: non-empty commands, usable storage
    /// locations and credentials.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        for (idx, runner) in self.runners.iter().enumerate() {
            if runner.kind == RunnerKind::Cmd && runner.cmd.is_empty() {
                return Err(ConfigLoadError::Invalid(format!(
                    "runners[{idx}]: kind = \"cmd\" requires a non-empty `cmd`"
                )));
            }
        }
        if let executor::ExecutorConfig::JsonRpc(rpc) = &self.executor
            && rpc.url.trim().is_empty()
        {
            return Err(ConfigLoadError::Invalid(
                "jsonrpc executor requires `url`".into(),
            ));
        }
        if let Some(memorizer) = &self.memorizer {
            match &memorizer.storage {
                StorageConfig::Redis { url } if url.trim().is_empty() => {
                    return Err(ConfigLoadError::Invalid(
                        "redis storage requires `url`".into(),
                    ));
                }
                StorageConfig::Disk { path } if path.as_os_str().is_empty() => {
                    return Err(ConfigLoadError::Invalid(
                        "disk storage requires `path`".into(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigLoadError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorizerConfig {
    pub namespace: String,
    /// Zero or negative stores entries without expiry.
    pub ttl_secs: i64,
    pub strategy: HashStrategy,
    pub storage: StorageConfig,
}

impl Default for MemorizerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl_secs: 0,
            strategy: HashStrategy::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Redis { url: String },
    Disk { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub ignore_memorized: bool,
    pub only_success: bool,
}

impl From<CollectorConfig> for CollectorOptions {
    fn from(config: CollectorConfig) -> Self {
        CollectorOptions {
            ignore_memorized: config.ignore_memorized,
            only_success: config.only_success,
        }
    }
}

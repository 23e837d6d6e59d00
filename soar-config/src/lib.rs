//! Configuration for the soar pipeline.
//!
//! A [`Config`] names the executor backend, the optional memorizer, the
//! collector switches and the runner chain. [`ConfigLoader`] resolves it from
//! an explicit file, `$SOAR_CONFIG_PATH`, `$SOAR_CONFIG_JSON`, a `soar.toml`
//! next to the caller, or built-in defaults, honouring `.env` first.
#![allow(missing_docs)]

mod duration;
pub mod error;
pub mod loader;
pub mod models;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigSource};
pub use models::executor::{
    DockerConfig, ExecutorConfig, JsonRpcConfig, KubeConfigRef, KubernetesConfig, ReadinessConfig,
};
pub use models::runner::{RunnerConfig, RunnerKind};
pub use models::{CollectorConfig, Config, MemorizerConfig, StorageConfig};

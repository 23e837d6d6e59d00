use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Image started by the container backends when none is configured.
pub const DEFAULT_IMAGE: &str = "soar-image:latest";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Where remote commands run. Tagged by `backend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ExecutorConfig {
    Docker(DockerConfig),
    Kubernetes(KubernetesConfig),
    JsonRpc(JsonRpcConfig),
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig::Docker(DockerConfig::default())
    }
}

impl ExecutorConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            ExecutorConfig::Docker(_) => "docker",
            ExecutorConfig::Kubernetes(_) => "kubernetes",
            ExecutorConfig::JsonRpc(_) => "jsonrpc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub image: String,
    /// Daemon address. Local defaults apply when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            host: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub namespace: String,
    pub image: String,
    pub kubeconfig: KubeConfigRef,
    pub readiness: ReadinessConfig,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            kubeconfig: KubeConfigRef::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

/// Kubeconfig location, tagged by `source`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum KubeConfigRef {
    #[default]
    Automatic,
    File { path: PathBuf },
    Content { content: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    #[serde(with = "crate::duration")]
    pub poll_interval: Duration,
    #[serde(with = "crate::duration")]
    pub timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonRpcConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for JsonRpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

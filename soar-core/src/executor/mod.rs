//! Remote command execution.
//!
//! An [`Executor`] is bound to one already-provisioned target (a container, a
//! pod or a daemon connection). Provisioning is backend specific and happens
//! before the first [`Executor::run`]. Every backend serializes its own calls:
//! no two exec sessions overlap on one executor.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, SoarError};

#[cfg(feature = "docker")]
#[cfg_attr(docsrs, doc(cfg(feature = "docker")))]
pub mod docker;
#[cfg(feature = "jsonrpc")]
#[cfg_attr(docsrs, doc(cfg(feature = "jsonrpc")))]
pub mod jsonrpc;
#[cfg(feature = "kubernetes")]
#[cfg_attr(docsrs, doc(cfg(feature = "kubernetes")))]
pub mod kubernetes;
pub mod traced;
pub mod wrapper;

pub use traced::TracingExecutor;
pub use wrapper::{RunnerCommand, WrapperReply};

/// Label key put on every container and pod this system creates.
pub const MANAGED_BY_LABEL: &str = "managed-by";
/// Label value paired with [`MANAGED_BY_LABEL`].
pub const MANAGED_BY_VALUE: &str = "soar";
/// Command that keeps a provisioned target alive between exec calls.
pub const KEEPALIVE_COMMAND: [&str; 2] = ["sleep", "infinity"];

/// `managed-by=soar`, as used in label selectors and filters.
pub fn managed_by_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOptions {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ignore_stdout: bool,
    /// Treat stderr output as advisory instead of failing the call.
    #[serde(default)]
    pub ignore_stderr: bool,
}

impl ExecOptions {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// `KEY=VALUE` pairs in key order.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Captured output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Fails on non-empty stderr unless the caller opted out for this call.
    pub fn check(self, options: &ExecOptions) -> Result<Self> {
        if self.stderr.is_empty() {
            return Ok(self);
        }
        if options.ignore_stderr {
            warn!(target: "soar::executor", stderr = %self.stderr.trim_end(), "ignoring stderr output");
            return Ok(self);
        }
        Err(SoarError::execution(self.stderr))
    }
}

/// Abstraction over "run a command remotely, inject files, read files back".
#[async_trait]
pub trait Executor: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn run(
        &self,
        cmd: &[String],
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput>;

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> Result<String> {
        let cmd = vec!["cat".to_string(), path.to_string()];
        let output = self.run(&cmd, &ExecOptions::default(), cancel).await?;
        Ok(output.stdout)
    }

    async fn write_file(&self, path: &str, content: &str, cancel: &CancellationToken) -> Result<()> {
        // base64 keeps arbitrary content clear of shell quoting
        let script = format!(
            "echo {} | base64 -d > {}",
            STANDARD.encode(content.as_bytes()),
            shell_quote(path)
        );
        let cmd = vec!["bash".to_string(), "-c".to_string(), script];
        self.run(&cmd, &ExecOptions::default(), cancel).await?;
        Ok(())
    }
}

/// Single-quotes `value` for `sh`/`bash`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}

/// Races `fut` against `cancel`.
pub async fn cancellable<F, T>(cancel: &CancellationToken, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SoarError::Cancelled(what.to_string())),
        result = fut => result,
    }
}

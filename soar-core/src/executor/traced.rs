use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ExecOptions, ExecOutput, Executor};
use crate::error::Result;

/// Logs every call that passes through the wrapped executor.
///
/// Inputs are logged before the call and outputs (or the error) after it,
/// all at `debug` under the `soar::executor` target.
#[derive(Clone)]
pub struct TracingExecutor {
    inner: Arc<dyn Executor>,
}

impl fmt::Debug for TracingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingExecutor")
            .field("inner", &self.inner.name())
            .finish()
    }
}

impl TracingExecutor {
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> Arc<dyn Executor> {
        self.inner
    }
}

#[async_trait]
impl Executor for TracingExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(
        &self,
        cmd: &[String],
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        debug!(
            target: "soar::executor",
            backend = self.inner.name(),
            ?cmd,
            env = ?options.env,
            ignore_stderr = options.ignore_stderr,
            "run"
        );
        let result = self.inner.run(cmd, options, cancel).await;
        match &result {
            Ok(output) => debug!(
                target: "soar::executor",
                backend = self.inner.name(),
                stdout_len = output.stdout.len(),
                stderr = %output.stderr.trim_end(),
                "run finished"
            ),
            Err(err) => debug!(target: "soar::executor", backend = self.inner.name(), error = %err, "run failed"),
        }
        result
    }

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> Result<String> {
        debug!(target: "soar::executor", backend = self.inner.name(), path, "read_file");
        let result = self.inner.read_file(path, cancel).await;
        if let Ok(content) = &result {
            debug!(target: "soar::executor", path, bytes = content.len(), "read_file finished");
        }
        result
    }

    async fn write_file(&self, path: &str, content: &str, cancel: &CancellationToken) -> Result<()> {
        debug!(
            target: "soar::executor",
            backend = self.inner.name(),
            path,
            bytes = content.len(),
            "write_file"
        );
        self.inner.write_file(path, content, cancel).await
    }
}

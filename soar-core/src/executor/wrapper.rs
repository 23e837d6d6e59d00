//! Command-line convention of the in-image `runner` wrapper.
//!
//! The wrapper writes injected files, execs the real command and prints one
//! JSON document with the captured streams and the collected files. This
//! saves a round trip per file compared to explicit `write_file`/`read_file`.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SoarError};

/// Location of the wrapper inside tool images.
pub const RUNNER_BINARY: &str = "/usr/local/bin/runner";

/// Builder for one wrapped invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerCommand {
    files: BTreeMap<String, String>,
    collect_files: Vec<String>,
    ignore_stdout: bool,
    ignore_stderr: bool,
    cmd: Vec<String>,
}

impl RunnerCommand {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Injects `content` at `path` before the command runs.
    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn files(mut self, files: &BTreeMap<String, String>) -> Self {
        self.files
            .extend(files.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Reads `path` back after the command exits.
    pub fn collect(mut self, path: impl Into<String>) -> Self {
        self.collect_files.push(path.into());
        self
    }

    pub fn collect_all(mut self, paths: &[String]) -> Self {
        self.collect_files.extend(paths.iter().cloned());
        self
    }

    pub fn ignore_stdout(mut self, ignore: bool) -> Self {
        self.ignore_stdout = ignore;
        self
    }

    pub fn ignore_stderr(mut self, ignore: bool) -> Self {
        self.ignore_stderr = ignore;
        self
    }

    /// The full argv, wrapper first and the real command after `--`.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![RUNNER_BINARY.to_string()];
        for (path, content) in &self.files {
            argv.push("--files".to_string());
            argv.push(format!("{path}:{}", STANDARD.encode(content.as_bytes())));
        }
        for path in &self.collect_files {
            argv.push("--collect-files".to_string());
            argv.push(path.clone());
        }
        if self.ignore_stdout {
            argv.push("--ignore-stdout".to_string());
        }
        if self.ignore_stderr {
            argv.push("--ignore-stderr".to_string());
        }
        argv.push("--".to_string());
        argv.extend(self.cmd.iter().cloned());
        argv
    }
}

/// JSON document printed by the wrapper on stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperReply {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl WrapperReply {
    /// Parses the wrapper output. A reported `error` fails the call; stderr
    /// alone is only a diagnostic.
    pub fn parse(raw: &str) -> Result<Self> {
        let reply: WrapperReply = serde_json::from_str(raw.trim()).map_err(|e| {
            SoarError::InvalidPayload(format!("runner wrapper returned malformed output: {e}"))
        })?;
        if let Some(error) = reply.error.as_deref().filter(|e| !e.is_empty()) {
            let message = if reply.stderr.is_empty() {
                error.to_string()
            } else {
                format!("{error}: {}", reply.stderr.trim_end())
            };
            return Err(SoarError::execution(message));
        }
        if !reply.stderr.is_empty() {
            warn!(target: "soar::executor", stderr = %reply.stderr.trim_end(), "runner wrapper reported stderr");
        }
        Ok(reply)
    }
}

//! Helpers for runners that shell out through the collector's executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collector::Collector;
use crate::error::Result;
use crate::executor::{ExecOptions, RunnerCommand, WrapperReply};

/// Environment and file plumbing around one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    /// Path to content, written before the command runs.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Paths read back after the command exits.
    #[serde(default)]
    pub collect_files: Vec<String>,
    #[serde(default)]
    pub ignore_stdout: bool,
    #[serde(default)]
    pub ignore_stderr: bool,
}

impl RunOptions {
    /// Layers `other` on top of `self`. Later values win per key.
    pub fn merged(mut self, other: &RunOptions) -> Self {
        self.envs
            .extend(other.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.files
            .extend(other.files.iter().map(|(k, v)| (k.clone(), v.clone())));
        for path in &other.collect_files {
            if !self.collect_files.contains(path) {
                self.collect_files.push(path.clone());
            }
        }
        self.ignore_stdout |= other.ignore_stdout;
        self.ignore_stderr |= other.ignore_stderr;
        self
    }

    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            env: self.envs.clone(),
            ignore_stdout: self.ignore_stdout,
            ignore_stderr: self.ignore_stderr,
        }
    }
}

/// How injected and collected files cross into the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTransfer {
    /// One `write_file`/`read_file` call per file around the command.
    #[default]
    RoundTrip,
    /// Everything in one call through the in-image `runner` wrapper.
    Wrapper,
}

/// Result of [`run_cmd`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdOutput {
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub files: BTreeMap<String, String>,
}

/// Writes the input files, runs `cmd` and reads back every collected file.
///
/// Non-empty stderr fails the call before any result file is read, unless the
/// options ask for stderr to be ignored.
pub async fn run_cmd(
    collector: &Collector,
    cmd: Vec<String>,
    options: &RunOptions,
    transfer: FileTransfer,
) -> Result<CmdOutput> {
    let executor = collector.executor();
    let cancel = collector.cancel_token();
    debug!(
        target: "soar::runner",
        backend = executor.name(),
        ?cmd,
        files = options.files.len(),
        collect = options.collect_files.len(),
        ?transfer,
        "running tool"
    );

    match transfer {
        FileTransfer::RoundTrip => {
            for (path, content) in &options.files {
                executor.write_file(path, content, cancel).await?;
            }
            let output = executor.run(&cmd, &options.exec_options(), cancel).await?;
            let mut files = BTreeMap::new();
            for path in &options.collect_files {
                let content = executor.read_file(path, cancel).await?;
                files.insert(path.clone(), content);
            }
            Ok(CmdOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                files,
            })
        }
        FileTransfer::Wrapper => {
            let argv = RunnerCommand::new(cmd)
                .files(&options.files)
                .collect_all(&options.collect_files)
                .ignore_stdout(options.ignore_stdout)
                .ignore_stderr(options.ignore_stderr)
                .argv();
            // the wrapper reports on stdout, so stdout is always attached here
            let exec_options = ExecOptions {
                ignore_stdout: false,
                ..options.exec_options()
            };
            let output = executor.run(&argv, &exec_options, cancel).await?;
            let reply = WrapperReply::parse(&output.stdout)?;
            Ok(CmdOutput {
                stdout: reply.stdout,
                stderr: reply.stderr,
                files: reply.files,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_options_prefer_later_values() {
        let base = RunOptions::default()
            .file("/tmp/a", "1")
            .file("/tmp/b", "1");
        let mut extra = RunOptions::default().file("/tmp/b", "2");
        extra.collect_files.push("/tmp/out".into());
        extra.envs.insert("K".into(), "v".into());

        let merged = base.merged(&extra).merged(&extra);
        assert_eq!(merged.files["/tmp/a"], "1");
        assert_eq!(merged.files["/tmp/b"], "2");
        assert_eq!(merged.collect_files, vec!["/tmp/out"]);
        assert_eq!(merged.exec_options().env["K"], "v");
    }
}

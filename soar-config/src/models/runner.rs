use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use soar_core::runner::builtin::ToolSettings;
use soar_core::runner::{FileTransfer, PriorityAdjust, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Subfinder,
    Dns,
    Naabu,
    Httpx,
    Nuclei,
    Unauthor,
    Cmd,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Subfinder => "subfinder",
            RunnerKind::Dns => "dns",
            RunnerKind::Naabu => "naabu",
            RunnerKind::Httpx => "httpx",
            RunnerKind::Nuclei => "nuclei",
            RunnerKind::Unauthor => "unauthor",
            RunnerKind::Cmd => "cmd",
        }
    }
}

/// One entry of the runner chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub kind: RunnerKind,
    #[serde(default)]
    pub only_success: bool,
    /// Log payloads entering and leaving the stage.
    #[serde(default)]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityAdjust>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Command for `kind = "cmd"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    /// Request path appended to each target for `kind = "httpx"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Service probed by `kind = "unauthor"`; `redis` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collect_files: Vec<String>,
    #[serde(default)]
    pub ignore_stdout: bool,
    #[serde(default)]
    pub ignore_stderr: bool,
    #[serde(default)]
    pub transfer: FileTransfer,
}

impl RunnerConfig {
    pub fn new(kind: RunnerKind) -> Self {
        Self {
            kind,
            only_success: false,
            debug: false,
            priority: None,
            args: Vec::new(),
            cmd: Vec::new(),
            path: String::new(),
            check: None,
            envs: BTreeMap::new(),
            files: BTreeMap::new(),
            collect_files: Vec::new(),
            ignore_stdout: false,
            ignore_stderr: false,
            transfer: FileTransfer::default(),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            envs: self.envs.clone(),
            files: self.files.clone(),
            collect_files: self.collect_files.clone(),
            ignore_stdout: self.ignore_stdout,
            ignore_stderr: self.ignore_stderr,
        }
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings::default()
            .with_args(self.args.iter().cloned())
            .with_options(self.run_options())
            .with_transfer(self.transfer)
    }
}

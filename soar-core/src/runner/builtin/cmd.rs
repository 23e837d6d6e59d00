use async_trait::async_trait;

use soar_model::RunnerData;

use super::ToolSettings;
use crate::collector::Collector;
use crate::error::{Result, SoarError};
use crate::runner::container::run_cmd;
use crate::runner::priority::DEFAULT_PRIORITY;
use crate::runner::{Runner, RunnerDescriptor};

/// Runs a fixed command once per batch, ignoring its inputs.
///
/// Emits a single synthetic record `{stdout, files}` with no parent input, so
/// its result is never written to the memorizer.
#[derive(Debug, Clone)]
pub struct CmdRunner {
    descriptor: RunnerDescriptor,
    cmd: Vec<String>,
    settings: ToolSettings,
}

impl CmdRunner {
    pub fn new(cmd: Vec<String>, settings: ToolSettings) -> Result<Self> {
        if cmd.is_empty() {
            return Err(SoarError::InvalidPayload("cmd runner needs a command".into()));
        }
        Ok(Self {
            descriptor: RunnerDescriptor::new("cmd", DEFAULT_PRIORITY),
            cmd,
            settings,
        })
    }
}

#[async_trait]
impl Runner for CmdRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    async fn run(&self, collector: &Collector, _inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>> {
        let mut cmd = self.cmd.clone();
        cmd.extend(self.settings.args.iter().cloned());
        let output = run_cmd(collector, cmd, &self.settings.options, self.settings.transfer).await?;
        let json = serde_json::json!({
            "stdout": output.stdout,
            "files": output.files,
        });
        Ok(vec![RunnerData::synthetic(json).with_success(true)])
    }
}

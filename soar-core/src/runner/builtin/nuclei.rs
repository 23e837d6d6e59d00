use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use soar_model::{Asset, RunnerData};

use super::{ToolSettings, parse_json_lines, unique};
use crate::collector::Collector;
use crate::error::Result;
use crate::runner::container::run_cmd;
use crate::runner::priority::EXPLOIT_RUNNER_PRIORITY;
use crate::runner::{AssetRunner, RunnerDescriptor};

/// Template scanning with nuclei. Every finding reported for an asset's
/// `host:port` is collected into its `response` array and marks it
/// successful.
#[derive(Debug, Clone)]
pub struct NucleiRunner {
    descriptor: RunnerDescriptor,
    settings: ToolSettings,
}

impl Default for NucleiRunner {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl NucleiRunner {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            descriptor: RunnerDescriptor::asset("nuclei", EXPLOIT_RUNNER_PRIORITY),
            settings,
        }
    }

    fn command(&self, targets: &[String]) -> Vec<String> {
        let mut cmd: Vec<String> = ["nuclei", "-silent", "-jsonl", "-disable-update-check", "-target"]
            .map(String::from)
            .to_vec();
        cmd.push(targets.join(","));
        cmd.extend(self.settings.args.iter().cloned());
        cmd
    }
}

fn group_findings(lines: Vec<Value>) -> HashMap<String, Vec<Value>> {
    let mut findings: HashMap<String, Vec<Value>> = HashMap::new();
    for line in lines {
        if let Some(host) = line.get("host").and_then(Value::as_str) {
            findings.entry(host.to_string()).or_default().push(line);
        }
    }
    findings
}

#[async_trait]
impl AssetRunner for NucleiRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    async fn run_assets(
        &self,
        collector: &Collector,
        inputs: Vec<RunnerData<Asset>>,
    ) -> Result<Vec<RunnerData<Asset>>> {
        if inputs.is_empty() {
            return Ok(inputs);
        }
        let targets = unique(
            inputs
                .iter()
                .map(|input| input.json.host_and_port())
                .collect::<std::result::Result<Vec<_>, _>>()?,
        );

        let output = run_cmd(
            collector,
            self.command(&targets),
            &self.settings.options,
            self.settings.transfer,
        )
        .await?;
        let findings = group_findings(parse_json_lines("nuclei", &output.stdout));

        let mut outputs = Vec::with_capacity(inputs.len());
        for mut input in inputs {
            let found = input
                .json
                .host_and_port()
                .ok()
                .and_then(|target| findings.get(&target).cloned());
            if let Some(found) = found {
                input.json.response = Some(Value::Array(found));
                input.json.success = true;
                input.success = true;
            }
            outputs.push(input);
        }
        Ok(outputs)
    }
}

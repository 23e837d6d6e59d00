use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use soar_model::{Asset, RunnerData};

use super::{ToolSettings, parse_json_lines, unique};
use crate::collector::Collector;
use crate::error::Result;
use crate::runner::container::run_cmd;
use crate::runner::priority::DOMAIN_RUNNER_PRIORITY;
use crate::runner::{AssetRunner, RunnerDescriptor};

#[derive(Debug, Deserialize)]
struct SubfinderLine {
    host: String,
    input: String,
}

/// Passive subdomain enumeration. Every input domain is kept and followed by
/// one child per discovered subdomain.
#[derive(Debug, Clone)]
pub struct SubfinderRunner {
    descriptor: RunnerDescriptor,
    settings: ToolSettings,
}

impl Default for SubfinderRunner {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl SubfinderRunner {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            descriptor: RunnerDescriptor::asset("subfinder", DOMAIN_RUNNER_PRIORITY),
            settings,
        }
    }

    fn command(&self, domains: &[String]) -> Vec<String> {
        let mut cmd: Vec<String> = ["subfinder", "-silent", "-json", "-d"]
            .map(String::from)
            .to_vec();
        cmd.push(domains.join(","));
        cmd.extend(self.settings.args.iter().cloned());
        cmd
    }
}

#[async_trait]
impl AssetRunner for SubfinderRunner {
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
        let domains = unique(
            inputs
                .iter()
                .map(|input| input.json.domain().map(str::to_string))
                .collect::<std::result::Result<Vec<_>, _>>()?,
        );

        let output = run_cmd(
            collector,
            self.command(&domains),
            &self.settings.options,
            self.settings.transfer,
        )
        .await?;

        let mut found: HashMap<String, Vec<String>> = HashMap::new();
        for line in parse_json_lines::<SubfinderLine>("subfinder", &output.stdout) {
            found.entry(line.input).or_default().push(line.host);
        }

        let mut outputs = Vec::new();
        for input in inputs {
            let names = input
                .json
                .domain()
                .ok()
                .and_then(|domain| found.get(domain))
                .cloned()
                .unwrap_or_default();
            let assets = input.json.split_by_subdomains(&names);
            outputs.extend(RunnerData::construct(input.source_input_index, assets, true));
        }
        Ok(outputs)
    }
}

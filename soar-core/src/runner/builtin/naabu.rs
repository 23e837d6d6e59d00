use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use soar_model::{Asset, PortSpec, Protocol, RunnerData};

use super::{ToolSettings, parse_json_lines, unique};
use crate::collector::Collector;
use crate::error::Result;
use crate::runner::container::run_cmd;
use crate::runner::priority::PORT_RUNNER_PRIORITY;
use crate::runner::{AssetRunner, RunnerDescriptor};

#[derive(Debug, Deserialize)]
struct NaabuLine {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    port: u16,
    #[serde(default)]
    protocol: Option<Protocol>,
}

/// Port scanning. Each asset with open ports is replaced by one child per
/// port; assets without findings pass through unchanged.
#[derive(Debug, Clone)]
pub struct NaabuRunner {
    descriptor: RunnerDescriptor,
    settings: ToolSettings,
}

impl Default for NaabuRunner {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl NaabuRunner {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            descriptor: RunnerDescriptor::asset("naabu", PORT_RUNNER_PRIORITY),
            settings,
        }
    }

    fn command(&self, hosts: &[String]) -> Vec<String> {
        let mut cmd: Vec<String> = [
            "naabu",
            "-disable-update-check",
            "-json",
            "-silent",
            "-ip-version",
            "4,6",
            "-host",
        ]
        .map(String::from)
        .to_vec();
        cmd.push(hosts.join(","));
        cmd.extend(self.settings.args.iter().cloned());
        cmd
    }
}

/// Open ports keyed by every name naabu reported them under.
fn index_ports(lines: Vec<NaabuLine>) -> HashMap<String, Vec<PortSpec>> {
    let mut ports: HashMap<String, Vec<PortSpec>> = HashMap::new();
    for line in lines.into_iter().filter(|line| line.port != 0) {
        let spec = PortSpec {
            port: line.port,
            protocol: line.protocol.unwrap_or(Protocol::Tcp),
        };
        for key in [line.host, line.ip].into_iter().flatten() {
            let entry = ports.entry(key).or_default();
            if !entry.contains(&spec) {
                entry.push(spec);
            }
        }
    }
    ports
}

#[async_trait]
impl AssetRunner for NaabuRunner {
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
        let hosts = unique(
            inputs
                .iter()
                .map(|input| input.json.host().map(str::to_string))
                .collect::<std::result::Result<Vec<_>, _>>()?,
        );

        let output = run_cmd(
            collector,
            self.command(&hosts),
            &self.settings.options,
            self.settings.transfer,
        )
        .await?;
        let ports = index_ports(parse_json_lines("naabu", &output.stdout));

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let found = input
                .json
                .host()
                .ok()
                .and_then(|host| ports.get(host))
                .or_else(|| input.json.ip().ok().and_then(|ip| ports.get(ip)));
            match found {
                Some(found) => {
                    let assets = input.json.split_by_ports(found);
                    outputs.extend(RunnerData::construct(input.source_input_index, assets, true));
                }
                None => outputs.push(input),
            }
        }
        Ok(outputs)
    }
}

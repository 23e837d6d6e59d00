use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use soar_model::{Asset, DnsRecord, RunnerData};

use super::{ToolSettings, parse_json_lines, unique};
use crate::collector::Collector;
use crate::error::Result;
use crate::runner::container::run_cmd;
use crate::runner::priority::DNS_RUNNER_PRIORITY;
use crate::runner::{AssetRunner, RunnerDescriptor};

/// Where the host list is written inside the target.
pub const DNSX_INPUT_PATH: &str = "/tmp/soar-dnsx-hosts.txt";

#[derive(Debug, Deserialize)]
struct DnsxLine {
    host: String,
    #[serde(default)]
    a: Vec<String>,
    #[serde(default)]
    aaaa: Vec<String>,
    #[serde(default)]
    cname: Vec<String>,
}

impl DnsxLine {
    fn into_record(self) -> (String, DnsRecord) {
        let mut record = DnsRecord::new();
        for (kind, values) in [("A", self.a), ("AAAA", self.aaaa), ("CNAME", self.cname)] {
            if !values.is_empty() {
                record.insert(kind.to_string(), values);
            }
        }
        (self.host, record)
    }
}

/// Resolves named assets. A resolved asset is replaced by one child per
/// address; unresolved and address-only assets pass through unchanged.
#[derive(Debug, Clone)]
pub struct DnsRunner {
    descriptor: RunnerDescriptor,
    settings: ToolSettings,
}

impl Default for DnsRunner {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl DnsRunner {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            descriptor: RunnerDescriptor::asset("dns", DNS_RUNNER_PRIORITY),
            settings,
        }
    }

    fn command(&self) -> Vec<String> {
        let mut cmd: Vec<String> = [
            "dnsx", "-silent", "-json", "-resp", "-a", "-aaaa", "-cname", "-l", DNSX_INPUT_PATH,
        ]
        .map(String::from)
        .to_vec();
        cmd.extend(self.settings.args.iter().cloned());
        cmd
    }
}

#[async_trait]
impl AssetRunner for DnsRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    async fn run_assets(
        &self,
        collector: &Collector,
        inputs: Vec<RunnerData<Asset>>,
    ) -> Result<Vec<RunnerData<Asset>>> {
        let hosts = unique(
            inputs
                .iter()
                .filter_map(|input| input.json.domain().ok().map(str::to_string)),
        );
        if hosts.is_empty() {
            return Ok(inputs);
        }

        let mut host_list = hosts.join("\n");
        host_list.push('\n');
        let options = self.settings.options.clone().file(DNSX_INPUT_PATH, host_list);
        let output = run_cmd(collector, self.command(), &options, self.settings.transfer).await?;

        let records: HashMap<String, DnsRecord> = parse_json_lines::<DnsxLine>("dnsx", &output.stdout)
            .into_iter()
            .map(DnsxLine::into_record)
            .collect();

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let record = input
                .json
                .domain()
                .ok()
                .and_then(|domain| records.get(domain))
                .filter(|record| !record.is_empty());
            match record {
                Some(record) => {
                    let assets = input.json.split_by_resolved_records(record);
                    let resolved = assets.iter().any(|asset| asset.success);
                    outputs.extend(RunnerData::construct(
                        input.source_input_index,
                        assets,
                        resolved,
                    ));
                }
                None => outputs.push(input),
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dnsx_line_keeps_only_answered_kinds() {
        let line: DnsxLine =
            serde_json::from_str(r#"{"host":"example.com","a":["1.2.3.4"],"cname":[]}"#).unwrap();
        let (host, record) = line.into_record();
        assert_eq!(host, "example.com");
        assert_eq!(record.len(), 1);
        assert_eq!(record["A"], vec!["1.2.3.4"]);
    }

    #[test]
    fn command_reads_hosts_from_file() {
        let cmd = DnsRunner::default().command();
        assert_eq!(cmd.last().map(String::as_str), Some(DNSX_INPUT_PATH));
        assert_eq!(cmd[0], "dnsx");
    }
}

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

/// Service checked when none is configured.
pub const DEFAULT_UNAUTHOR_CHECK: &str = "redis";

/// Unauthenticated-access checks with unauthor. The tool's verdict for an
/// asset's `host:port` becomes its `response`; the verdict's `success` flag
/// becomes the asset's.
#[derive(Debug, Clone)]
pub struct UnauthorRunner {
    descriptor: RunnerDescriptor,
    settings: ToolSettings,
    check: String,
}

impl Default for UnauthorRunner {
    fn default() -> Self {
        Self::new(DEFAULT_UNAUTHOR_CHECK, ToolSettings::default())
    }
}

impl UnauthorRunner {
    pub fn new(check: impl Into<String>, settings: ToolSettings) -> Self {
        Self {
            descriptor: RunnerDescriptor::asset("unauthor", EXPLOIT_RUNNER_PRIORITY),
            settings,
            check: check.into(),
        }
    }

    pub fn check(&self) -> &str {
        &self.check
    }

    fn command(&self, targets: &[String]) -> Vec<String> {
        let mut cmd = vec![
            "unauthor".to_string(),
            "--type".to_string(),
            self.check.clone(),
            "-t".to_string(),
            targets.join(","),
        ];
        cmd.extend(self.settings.args.iter().cloned());
        cmd
    }
}

fn index_verdicts(lines: Vec<Value>) -> HashMap<String, Value> {
    lines
        .into_iter()
        .filter_map(|line| {
            let target = line.get("target").and_then(Value::as_str)?.to_string();
            Some((target, line))
        })
        .collect()
}

#[async_trait]
impl AssetRunner for UnauthorRunner {
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
        let verdicts = index_verdicts(parse_json_lines("unauthor", &output.stdout));

        let mut outputs = Vec::with_capacity(inputs.len());
        for mut input in inputs {
            let verdict = input
                .json
                .host_and_port()
                .ok()
                .and_then(|target| verdicts.get(&target).cloned());
            if let Some(verdict) = verdict {
                let success = verdict.get("success").and_then(Value::as_bool).unwrap_or(false);
                input.json.response = Some(verdict);
                input.json.success = success;
                input.success = success;
            }
            outputs.push(input);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verdicts_are_keyed_by_target() {
        let verdicts = index_verdicts(vec![
            json!({"target": "10.0.0.1:6379", "success": true}),
            json!({"target": "10.0.0.2:6379", "success": false}),
            json!({"success": true}),
        ]);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts["10.0.0.1:6379"]["success"], true);
    }

    #[test]
    fn command_names_the_check() {
        let runner = UnauthorRunner::default();
        assert_eq!(runner.check(), DEFAULT_UNAUTHOR_CHECK);
        assert_eq!(
            runner.command(&["10.0.0.1:6379".into(), "10.0.0.2:6379".into()]),
            vec!["unauthor", "--type", "redis", "-t", "10.0.0.1:6379,10.0.0.2:6379"]
        );
    }
}

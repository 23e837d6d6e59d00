use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use soar_model::{Asset, BinaryAttachment, RunnerData};

use super::{ToolSettings, parse_json_lines, unique};
use crate::collector::Collector;
use crate::error::Result;
use crate::runner::container::run_cmd;
use crate::runner::priority::APP_RUNNER_PRIORITY;
use crate::runner::{AssetRunner, RunnerDescriptor};

pub const RESPONSE_ATTACHMENT: &str = "response";
pub const SCREENSHOT_ATTACHMENT: &str = "screenshot";

/// HTTP probing of `host:port` targets.
///
/// A probed asset gets the httpx JSON line as its `response` and is marked
/// successful. The rendered body and the screenshot, when httpx produced them,
/// move out of the response into attachments. Unanswered assets pass through.
#[derive(Debug, Clone)]
pub struct HttpxRunner {
    descriptor: RunnerDescriptor,
    settings: ToolSettings,
    path: String,
}

impl Default for HttpxRunner {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl HttpxRunner {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            descriptor: RunnerDescriptor::asset("httpx", APP_RUNNER_PRIORITY),
            settings,
            path: String::new(),
        }
    }

    /// Request path appended to every target, e.g. `/login`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn target(&self, asset: &Asset) -> Result<String> {
        Ok(format!("{}{}", asset.host_and_port()?, self.path))
    }

    fn command(&self, targets: &[String]) -> Vec<String> {
        let mut cmd: Vec<String> = ["httpx", "-disable-update-check", "-json", "-silent", "-target"]
            .map(String::from)
            .to_vec();
        cmd.push(targets.join(","));
        cmd.extend(self.settings.args.iter().cloned());
        cmd
    }
}

/// Splits the binary fields off one httpx line.
fn into_response(mut line: Map<String, Value>) -> (Value, Vec<(&'static str, BinaryAttachment)>) {
    let mut attachments = Vec::new();
    if let Some(Value::String(body)) = line.remove("headless_body") {
        let mime = line
            .get("content_type")
            .and_then(Value::as_str)
            .filter(|mime| !mime.is_empty())
            .unwrap_or("text/plain")
            .to_string();
        attachments.push((
            RESPONSE_ATTACHMENT,
            BinaryAttachment::from_bytes(mime, body.as_bytes()).with_file_name("response.txt"),
        ));
    }
    if let Some(Value::String(data)) = line.remove("screenshot_bytes") {
        // httpx already emits the screenshot base64 encoded
        attachments.push((
            SCREENSHOT_ATTACHMENT,
            BinaryAttachment {
                mime_type: "image/png".to_string(),
                data,
                file_name: Some("screenshot.png".to_string()),
            },
        ));
    }
    (Value::Object(line), attachments)
}

#[async_trait]
impl AssetRunner for HttpxRunner {
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
                .map(|input| self.target(&input.json))
                .collect::<Result<Vec<_>>>()?,
        );

        let output = run_cmd(
            collector,
            self.command(&targets),
            &self.settings.options,
            self.settings.transfer,
        )
        .await?;

        let mut responses: HashMap<String, Map<String, Value>> = HashMap::new();
        for line in parse_json_lines::<Map<String, Value>>("httpx", &output.stdout) {
            if let Some(input) = line.get("input").and_then(Value::as_str) {
                responses.insert(input.to_string(), line);
            }
        }

        let mut outputs = Vec::with_capacity(inputs.len());
        for mut input in inputs {
            let answered = self
                .target(&input.json)
                .ok()
                .and_then(|target| responses.get(&target).cloned());
            if let Some(line) = answered {
                let (response, attachments) = into_response(line);
                input.json.response = Some(response);
                for (name, attachment) in attachments {
                    input.json.attachments.insert(name.to_string(), attachment);
                }
                input.json.success = true;
                input.success = true;
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
    fn binary_fields_become_attachments() {
        let line = json!({
            "input": "example.com:443",
            "status_code": 200,
            "content_type": "text/html",
            "headless_body": "<html></html>",
            "screenshot_bytes": "iVBORw0K",
        });
        let Value::Object(line) = line else {
            unreachable!()
        };

        let (response, attachments) = into_response(line);
        assert_eq!(response["status_code"], 200);
        assert!(response.get("headless_body").is_none());
        assert!(response.get("screenshot_bytes").is_none());

        let (name, body) = &attachments[0];
        assert_eq!(*name, RESPONSE_ATTACHMENT);
        assert_eq!(body.mime_type, "text/html");
        assert_eq!(body.bytes().unwrap(), b"<html></html>");
        let (name, shot) = &attachments[1];
        assert_eq!(*name, SCREENSHOT_ATTACHMENT);
        assert_eq!(shot.data, "iVBORw0K");
        assert_eq!(shot.file_name.as_deref(), Some("screenshot.png"));
    }

    #[test]
    fn targets_carry_port_and_path() {
        let runner = HttpxRunner::default().with_path("/login");
        let mut asset = Asset::from_domain("example.com");
        asset.basic.port = Some(8443);
        assert_eq!(runner.target(&asset).unwrap(), "example.com:8443/login");
        assert!(runner.target(&Asset::from_domain("example.com")).is_err());

        let cmd = runner.command(&["a.test:80/login".into(), "b.test:443/login".into()]);
        assert_eq!(cmd.last().map(String::as_str), Some("a.test:80/login,b.test:443/login"));
        assert_eq!(runner.descriptor().priority, APP_RUNNER_PRIORITY);
    }
}

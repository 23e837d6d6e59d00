//! Runners for the tools shipped in the soar image.

use serde::de::DeserializeOwned;
use tracing::warn;

use super::container::{FileTransfer, RunOptions};

mod cmd;
mod dns;
mod httpx;
mod naabu;
mod nuclei;
mod subfinder;
mod unauthor;

pub use cmd::CmdRunner;
pub use dns::DnsRunner;
pub use httpx::{HttpxRunner, RESPONSE_ATTACHMENT, SCREENSHOT_ATTACHMENT};
pub use naabu::NaabuRunner;
pub use nuclei::NucleiRunner;
pub use subfinder::SubfinderRunner;
pub use unauthor::{DEFAULT_UNAUTHOR_CHECK, UnauthorRunner};

/// Invocation knobs shared by every tool runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSettings {
    /// Extra argv appended after the runner's own flags.
    pub args: Vec<String>,
    pub options: RunOptions,
    pub transfer: FileTransfer,
}

impl ToolSettings {
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transfer(mut self, transfer: FileTransfer) -> Self {
        self.transfer = transfer;
        self
    }
}

/// Parses one JSON document per non-blank line. Lines that do not parse are
/// tool chatter and are skipped with a warning.
pub(crate) fn parse_json_lines<T: DeserializeOwned>(tool: &str, stdout: &str) -> Vec<T> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(target: "soar::runner", tool, error = %e, line, "skipping unparseable output line");
                None
            }
        })
        .collect()
}

/// Distinct values in first-seen order.
pub(crate) fn unique<I: IntoIterator<Item = String>>(values: I) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

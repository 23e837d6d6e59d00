use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use soar_model::RunnerData;

use super::{AssetRunner, Runner, RunnerDescriptor};
use crate::collector::Collector;
use crate::error::Result;

/// Exposes an [`AssetRunner`] as a JSON [`Runner`].
///
/// Payloads are coerced into assets on the way in (a payload that is not an
/// asset fails the stage) and serialized back on the way out.
pub struct AssetRunnerAdapter<R> {
    inner: R,
}

impl<R: AssetRunner> fmt::Debug for AssetRunnerAdapter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRunnerAdapter")
            .field("descriptor", self.inner.descriptor())
            .finish()
    }
}

impl<R: AssetRunner> AssetRunnerAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: AssetRunner> Runner for AssetRunnerAdapter<R> {
    fn descriptor(&self) -> &RunnerDescriptor {
        self.inner.descriptor()
    }

    async fn run(&self, collector: &Collector, inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>> {
        let assets = inputs
            .into_iter()
            .map(|record| record.into_asset())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let outputs = self.inner.run_assets(collector, assets).await?;
        Ok(outputs
            .into_iter()
            .map(|record| record.into_value())
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

/// Applies the success protocol around a success-aware runner.
///
/// Inputs have their success flag cleared before the call; when
/// `only_success` is set, outputs not marked successful are dropped after it.
/// Runners that are not success-aware pass through untouched.
pub struct FilteringRunner {
    inner: Arc<dyn Runner>,
    only_success: bool,
}

impl fmt::Debug for FilteringRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteringRunner")
            .field("runner", &self.inner.name())
            .field("only_success", &self.only_success)
            .finish()
    }
}

impl FilteringRunner {
    pub fn new(inner: Arc<dyn Runner>, only_success: bool) -> Self {
        Self {
            inner,
            only_success,
        }
    }
}

#[async_trait]
impl Runner for FilteringRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        self.inner.descriptor()
    }

    async fn run(&self, collector: &Collector, mut inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>> {
        if !self.inner.descriptor().only_success_aware {
            return self.inner.run(collector, inputs).await;
        }
        for input in &mut inputs {
            input.success = false;
        }
        let mut outputs = self.inner.run(collector, inputs).await?;
        if self.only_success {
            let before = outputs.len();
            outputs.retain(|record| record.success);
            debug!(
                target: "soar::runner",
                runner = self.inner.name(),
                kept = outputs.len(),
                dropped = before - outputs.len(),
                "only-success filter"
            );
        }
        Ok(outputs)
    }
}

/// Logs the payloads entering and leaving a runner.
pub struct TracingRunner {
    inner: Arc<dyn Runner>,
}

impl fmt::Debug for TracingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingRunner")
            .field("runner", &self.inner.name())
            .finish()
    }
}

impl TracingRunner {
    pub fn new(inner: Arc<dyn Runner>) -> Self {
        Self { inner }
    }
}

fn payloads(records: &[RunnerData]) -> String {
    let values: Vec<&Value> = records.iter().map(|r| &r.json).collect();
    serde_json::to_string(&values).unwrap_or_default()
}

#[async_trait]
impl Runner for TracingRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        self.inner.descriptor()
    }

    async fn run(&self, collector: &Collector, inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>> {
        debug!(
            target: "soar::runner",
            runner = self.inner.name(),
            count = inputs.len(),
            input = %payloads(&inputs),
            "runner input"
        );
        let outputs = self.inner.run(collector, inputs).await?;
        debug!(
            target: "soar::runner",
            runner = self.inner.name(),
            count = outputs.len(),
            output = %payloads(&outputs),
            "runner output"
        );
        Ok(outputs)
    }
}

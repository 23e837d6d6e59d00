//! One pipeline invocation.
//!
//! The collector binds an executor, an optional memorizer and a set of
//! runners. [`Collector::collect`] answers cached inputs from the memorizer,
//! folds the rest through the runners in priority order, writes the fresh
//! results back keyed by their originating input and returns cached and fresh
//! records together.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use soar_model::RunnerData;

use crate::error::{Result, SoarError};
use crate::executor::Executor;
use crate::memorizer::Memorizer;
use crate::runner::Runner;
use crate::runner::priority::{Priority, sort_by_priority};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorOptions {
    /// Recompute every input and leave cached results out of the output.
    /// Lookups still run so the report counts hits.
    #[serde(default)]
    pub ignore_memorized: bool,
    /// Drop records not marked successful from the final fold result.
    #[serde(default)]
    pub only_success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Executing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub priority: Priority,
    pub state: StageState,
    pub inputs: usize,
    pub outputs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectReport {
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// One entry per runner, in execution order.
    pub stages: Vec<StageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collected {
    /// Cached records first, then fresh ones. `source_input_index` refers to
    /// the caller's input positions.
    pub outputs: Vec<RunnerData>,
    pub report: CollectReport,
}

pub struct Collector {
    executor: Arc<dyn Executor>,
    memorizer: Option<Memorizer>,
    runners: Vec<Arc<dyn Runner>>,
    options: CollectorOptions,
    cancel: CancellationToken,
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runners: Vec<&str> = self.runners.iter().map(|r| r.name()).collect();
        f.debug_struct("Collector")
            .field("executor", &self.executor.name())
            .field("memorizer", &self.memorizer)
            .field("runners", &runners)
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Collector {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            memorizer: None,
            runners: Vec::new(),
            options: CollectorOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_memorizer(mut self, memorizer: Memorizer) -> Self {
        self.memorizer = Some(memorizer);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runners.push(runner);
        self
    }

    pub fn with_runners(mut self, runners: impl IntoIterator<Item = Arc<dyn Runner>>) -> Self {
        self.runners.extend(runners);
        self
    }

    pub fn with_options(mut self, options: CollectorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The executor bound to this invocation. Runners issue their remote
    /// calls through it, one at a time.
    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn options(&self) -> CollectorOptions {
        self.options
    }

    /// Runners in execution order.
    pub fn ordered_runners(&self) -> Vec<Arc<dyn Runner>> {
        let mut runners = self.runners.clone();
        sort_by_priority(&mut runners);
        runners
    }

    /// Wraps raw payloads as inputs numbered by position.
    pub async fn collect_values(&self, inputs: Vec<Value>) -> Result<Collected> {
        let records = inputs
            .into_iter()
            .enumerate()
            .map(|(idx, json)| RunnerData::new(json, Some(idx)))
            .collect();
        self.collect(records).await
    }

    /// Runs one batch. An input's position is its `source_input_index`, or
    /// its index in `inputs` when unset.
    pub async fn collect(&self, inputs: Vec<RunnerData>) -> Result<Collected> {
        let mut report = CollectReport::default();
        let positions: Vec<usize> = inputs
            .iter()
            .enumerate()
            .map(|(idx, input)| input.source_input_index.unwrap_or(idx))
            .collect();

        let mut outputs = Vec::new();
        let mut pending: Vec<(usize, RunnerData)> = Vec::with_capacity(inputs.len());

        match &self.memorizer {
            Some(memorizer) => {
                let cached = memorizer.batch_load(&inputs).await?;
                for ((input, position), hit) in inputs.into_iter().zip(&positions).zip(cached) {
                    match hit {
                        Some(records) => {
                            report.cache_hits += 1;
                            if self.options.ignore_memorized {
                                pending.push((*position, input));
                            } else {
                                outputs.extend(records.into_iter().map(|mut record| {
                                    record.source_input_index = Some(*position);
                                    record
                                }));
                            }
                        }
                        None => {
                            report.cache_misses += 1;
                            pending.push((*position, input));
                        }
                    }
                }
            }
            None => pending.extend(positions.iter().copied().zip(inputs)),
        }

        let runners = self.ordered_runners();
        report.stages = runners
            .iter()
            .map(|runner| StageRecord {
                name: runner.name().to_string(),
                priority: runner.priority(),
                state: StageState::Pending,
                inputs: 0,
                outputs: 0,
            })
            .collect();

        if pending.is_empty() {
            info!(
                target: "soar::collector",
                hits = report.cache_hits,
                outputs = outputs.len(),
                "all inputs answered from cache"
            );
            return Ok(Collected { outputs, report });
        }

        // fold indices are positions in `fold_inputs`; mapped back to callers at the end
        let (callers, fold_inputs): (Vec<usize>, Vec<RunnerData>) = pending
            .into_iter()
            .enumerate()
            .map(|(fold_idx, (position, mut input))| {
                input.source_input_index = Some(fold_idx);
                (position, input)
            })
            .unzip();

        let mut records = fold_inputs.clone();
        for (runner, stage) in runners.iter().zip(report.stages.iter_mut()) {
            if self.cancel.is_cancelled() {
                return Err(SoarError::Cancelled(format!("before stage '{}'", runner.name())));
            }
            stage.state = StageState::Executing;
            stage.inputs = records.len();
            debug!(
                target: "soar::collector",
                stage = runner.name(),
                priority = runner.priority(),
                inputs = records.len(),
                "stage started"
            );
            match runner.run(self, records).await {
                Ok(next) => {
                    stage.state = StageState::Succeeded;
                    stage.outputs = next.len();
                    records = next;
                }
                Err(err) => {
                    stage.state = StageState::Failed;
                    warn!(target: "soar::collector", stage = runner.name(), error = %err, "stage failed");
                    return Err(SoarError::stage(runner.name(), err));
                }
            }
        }

        if self.options.only_success {
            records.retain(|record| record.success);
        }

        if let Some(memorizer) = &self.memorizer {
            let paired = pair_by_source(&records, fold_inputs.len());
            // results are already computed; a failed write-back only costs the next run
            if let Err(err) = memorizer.batch_save(&fold_inputs, &paired).await {
                warn!(target: "soar::collector", error = %err, "failed to memorize results");
            }
        }

        let fresh = records.len();
        outputs.extend(records.into_iter().map(|mut record| {
            record.source_input_index = record
                .source_input_index
                .and_then(|fold_idx| callers.get(fold_idx).copied());
            record
        }));

        info!(
            target: "soar::collector",
            hits = report.cache_hits,
            misses = report.cache_misses,
            stages = report.stages.len(),
            fresh,
            outputs = outputs.len(),
            "collect finished"
        );
        Ok(Collected { outputs, report })
    }
}

/// Groups fold outputs under the input they descend from. Synthetic records
/// and indices outside the batch are left out.
fn pair_by_source(records: &[RunnerData], inputs: usize) -> Vec<Vec<RunnerData>> {
    let mut paired = vec![Vec::new(); inputs];
    for record in records {
        match record.source_input_index {
            Some(idx) if idx < inputs => paired[idx].push(record.clone()),
            Some(idx) => {
                warn!(target: "soar::collector", index = idx, "output points outside the batch; not cached");
            }
            None => {}
        }
    }
    paired
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairing_skips_synthetic_and_stray_records() {
        let records = vec![
            RunnerData::new(json!("a0"), Some(0)),
            RunnerData::synthetic(json!("s")),
            RunnerData::new(json!("a1"), Some(1)),
            RunnerData::new(json!("a0b"), Some(0)),
            RunnerData::new(json!("x"), Some(9)),
        ];
        let paired = pair_by_source(&records, 3);
        assert_eq!(paired.len(), 3);
        assert_eq!(paired[0].len(), 2);
        assert_eq!(paired[1].len(), 1);
        assert!(paired[2].is_empty());
    }
}

//! Pipeline stages.
//!
//! A [`Runner`] turns a batch of records into a new batch. Asset-typed stages
//! implement [`AssetRunner`] instead and are adapted to the JSON record shape
//! by [`AssetRunnerAdapter`]. Cross-cutting behavior lives in explicit
//! wrappers composed by [`RunnerBuilder`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use soar_model::{Asset, RunnerData};

use crate::collector::Collector;
use crate::error::Result;

pub mod builder;
pub mod builtin;
pub mod container;
pub mod decorators;
pub mod priority;

pub use builder::RunnerBuilder;
pub use container::{CmdOutput, FileTransfer, RunOptions};
pub use decorators::{AssetRunnerAdapter, FilteringRunner, TracingRunner};
pub use priority::{Priority, PriorityAdjust, PriorityRunner};

/// Static facts about a runner, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerDescriptor {
    pub name: String,
    pub priority: Priority,
    /// Inputs are coerced into [`Asset`] before the stage runs.
    pub asset_runner: bool,
    /// Input success flags are reset before the stage and, in only-success
    /// mode, outputs without the flag are dropped after it.
    pub only_success_aware: bool,
}

impl RunnerDescriptor {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            name: name.into(),
            priority,
            asset_runner: false,
            only_success_aware: false,
        }
    }

    /// Asset stages are always success-aware.
    pub fn asset(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            asset_runner: true,
            only_success_aware: true,
            ..Self::new(name, priority)
        }
    }

    pub fn only_success_aware(mut self, aware: bool) -> Self {
        self.only_success_aware = aware;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
pub trait Runner: Send + Sync {
    fn descriptor(&self) -> &RunnerDescriptor;

    async fn run(&self, collector: &Collector, inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn priority(&self) -> Priority {
        self.descriptor().priority
    }
}

/// A stage operating on typed assets.
#[async_trait]
pub trait AssetRunner: Send + Sync {
    fn descriptor(&self) -> &RunnerDescriptor;

    async fn run_assets(
        &self,
        collector: &Collector,
        inputs: Vec<RunnerData<Asset>>,
    ) -> Result<Vec<RunnerData<Asset>>>;
}

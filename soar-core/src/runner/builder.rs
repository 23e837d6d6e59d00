use std::fmt;
use std::sync::Arc;

use super::decorators::{AssetRunnerAdapter, FilteringRunner, TracingRunner};
use super::priority::{PriorityAdjust, PriorityRunner};
use super::{AssetRunner, Runner};

/// Wraps a runner in the standard decorators.
///
/// The composition order is fixed: asset adapter, success filter, tracing,
/// priority override. Tracing therefore logs what the collector sees, and a
/// priority override never re-applies the success protocol.
pub struct RunnerBuilder {
    runner: Arc<dyn Runner>,
    only_success: bool,
    debug: bool,
    priority: Option<PriorityAdjust>,
}

impl fmt::Debug for RunnerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerBuilder")
            .field("runner", &self.runner.name())
            .field("only_success", &self.only_success)
            .field("debug", &self.debug)
            .field("priority", &self.priority)
            .finish()
    }
}

impl RunnerBuilder {
    pub fn new(runner: impl Runner + 'static) -> Self {
        Self::from_arc(Arc::new(runner))
    }

    pub fn asset(runner: impl AssetRunner + 'static) -> Self {
        Self::new(AssetRunnerAdapter::new(runner))
    }

    pub fn from_arc(runner: Arc<dyn Runner>) -> Self {
        Self {
            runner,
            only_success: false,
            debug: false,
            priority: None,
        }
    }

    pub fn only_success(mut self, only_success: bool) -> Self {
        self.only_success = only_success;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn priority(mut self, adjust: Option<PriorityAdjust>) -> Self {
        self.priority = adjust;
        self
    }

    pub fn build(self) -> Arc<dyn Runner> {
        let mut runner: Arc<dyn Runner> = Arc::new(FilteringRunner::new(self.runner, self.only_success));
        if self.debug {
            runner = Arc::new(TracingRunner::new(runner));
        }
        if let Some(adjust) = self.priority {
            runner = Arc::new(PriorityRunner::new(runner, adjust));
        }
        runner
    }
}

//! Stage ordering.
//!
//! The collector sorts runners by ascending priority: a lower value runs
//! earlier. The built-in levels follow the path from naming to exploitation
//! (domain, DNS, IP, port, banner, application, exploit). Runners with equal
//! priority keep the order in which they were registered.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use soar_model::RunnerData;

use super::{Runner, RunnerDescriptor};
use crate::collector::Collector;
use crate::error::Result;

pub type Priority = i32;

pub const DOMAIN_RUNNER_PRIORITY: Priority = 10;
pub const DNS_RUNNER_PRIORITY: Priority = 20;
pub const IP_RUNNER_PRIORITY: Priority = 30;
pub const PORT_RUNNER_PRIORITY: Priority = 40;
pub const BANNER_RUNNER_PRIORITY: Priority = 50;
pub const APP_RUNNER_PRIORITY: Priority = 60;
pub const EXPLOIT_RUNNER_PRIORITY: Priority = 70;
pub const DEFAULT_PRIORITY: Priority = 100;

/// Sorts `runners` into execution order. The sort is stable.
pub fn sort_by_priority(runners: &mut [Arc<dyn Runner>]) {
    runners.sort_by_key(|runner| runner.priority());
}

/// How a [`PriorityRunner`] derives its priority from the wrapped runner's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum PriorityAdjust {
    Increase(Priority),
    Decrease(Priority),
    Set(Priority),
}

impl PriorityAdjust {
    pub fn apply(self, priority: Priority) -> Priority {
        match self {
            PriorityAdjust::Increase(delta) => priority.saturating_add(delta),
            PriorityAdjust::Decrease(delta) => priority.saturating_sub(delta),
            PriorityAdjust::Set(value) => value,
        }
    }
}

/// Re-tags a runner with a different priority.
///
/// `run` goes straight to the wrapped runner, so success reset and filtering
/// applied inside it happen exactly once.
pub struct PriorityRunner {
    inner: Arc<dyn Runner>,
    descriptor: RunnerDescriptor,
}

impl std::fmt::Debug for PriorityRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityRunner")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl PriorityRunner {
    pub fn new(inner: Arc<dyn Runner>, adjust: PriorityAdjust) -> Self {
        let descriptor = inner
            .descriptor()
            .clone()
            .with_priority(adjust.apply(inner.priority()));
        Self { inner, descriptor }
    }
}

#[async_trait]
impl Runner for PriorityRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    async fn run(&self, collector: &Collector, inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>> {
        self.inner.run(collector, inputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustments_saturate() {
        assert_eq!(PriorityAdjust::Increase(5).apply(DNS_RUNNER_PRIORITY), 25);
        assert_eq!(PriorityAdjust::Decrease(5).apply(DNS_RUNNER_PRIORITY), 15);
        assert_eq!(PriorityAdjust::Set(-1).apply(DNS_RUNNER_PRIORITY), -1);
        assert_eq!(PriorityAdjust::Increase(1).apply(Priority::MAX), Priority::MAX);
    }

    #[test]
    fn adjust_reads_from_tagged_json() {
        let adjust: PriorityAdjust =
            serde_json::from_str(r#"{ "mode": "decrease", "value": 3 }"#).unwrap();
        assert_eq!(adjust, PriorityAdjust::Decrease(3));
    }

    #[test]
    fn levels_run_from_naming_to_exploitation() {
        let levels = [
            DOMAIN_RUNNER_PRIORITY,
            DNS_RUNNER_PRIORITY,
            IP_RUNNER_PRIORITY,
            PORT_RUNNER_PRIORITY,
            BANNER_RUNNER_PRIORITY,
            APP_RUNNER_PRIORITY,
            EXPLOIT_RUNNER_PRIORITY,
            DEFAULT_PRIORITY,
        ];
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }
}

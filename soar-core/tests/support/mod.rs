//! Shared doubles for collector integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use soar_core::executor::{ExecOptions, ExecOutput, Executor};
use soar_core::memorizer::MemorizerStorage;
use soar_core::model::RunnerData;
use soar_core::runner::Priority;
use soar_core::{Collector, Result, Runner, RunnerDescriptor, SoarError};

/// Answers commands by program name and remembers every argv it saw.
/// Unknown programs succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    replies: HashMap<String, ExecOutput>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, program: &str, stdout: &str, stderr: &str) -> Self {
        self.replies
            .insert(program.to_string(), ExecOutput::new(stdout, stderr));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|argv| argv.first().cloned())
            .collect()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(
        &self,
        cmd: &[String],
        options: &ExecOptions,
        _cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(cmd.to_vec());
        }
        let program = cmd.first().map(String::as_str).unwrap_or_default();
        self.replies
            .get(program)
            .cloned()
            .unwrap_or_default()
            .check(options)
    }
}

/// Storage that never holds anything and rejects every write.
#[derive(Debug, Default)]
pub struct ReadOnlyStorage {
    writes: Mutex<usize>,
}

impl ReadOnlyStorage {
    pub fn writes(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or_default()
    }
}

#[async_trait]
impl MemorizerStorage for ReadOnlyStorage {
    async fn set(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> Result<()> {
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Err(SoarError::Storage("read-only".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// What a [`SpyRunner`] does with its batch.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Returns the batch unchanged.
    PassThrough,
    /// Emits one record per input, successful where the mask says so. The
    /// mask repeats when shorter than the batch.
    Mark(Vec<bool>),
    Fail(String),
}

/// Runner that logs its invocations into a shared journal.
#[derive(Debug)]
pub struct SpyRunner {
    descriptor: RunnerDescriptor,
    behavior: Behavior,
    journal: Arc<Mutex<Vec<String>>>,
    seen: Mutex<Vec<Vec<RunnerData>>>,
}

impl SpyRunner {
    pub fn new(name: &str, priority: Priority, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            descriptor: RunnerDescriptor::new(name, priority),
            behavior: Behavior::PassThrough,
            journal: Arc::clone(journal),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Opts into the success protocol.
    pub fn aware(mut self) -> Self {
        self.descriptor = self.descriptor.only_success_aware(true);
        self
    }

    /// Batches received so far, in call order.
    pub fn seen(&self) -> Vec<Vec<RunnerData>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.seen().len()
    }
}

#[async_trait]
impl Runner for SpyRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    async fn run(&self, _collector: &Collector, inputs: Vec<RunnerData>) -> Result<Vec<RunnerData>> {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(self.descriptor.name.clone());
        }
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(inputs.clone());
        }
        match &self.behavior {
            Behavior::PassThrough => Ok(inputs),
            Behavior::Mark(mask) => Ok(inputs
                .into_iter()
                .enumerate()
                .map(|(i, input)| {
                    let success = mask.get(i % mask.len().max(1)).copied().unwrap_or(true);
                    input.with_success(success)
                })
                .collect()),
            Behavior::Fail(message) => Err(SoarError::execution(message.clone())),
        }
    }
}

pub fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    journal.lock().map(|j| j.clone()).unwrap_or_default()
}

pub fn payloads(records: &[RunnerData]) -> Vec<Value> {
    records.iter().map(|record| record.json.clone()).collect()
}

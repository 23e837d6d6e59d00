//! # Soar Core
//!
//! Orchestration engine for the soar recon pipeline: remote executors,
//! the memorizer cache, runner stages and the collector that threads assets
//! through them.
//!
//! ## Overview
//!
//! - **Executor**: run a command on one provisioned target (Docker container,
//!   Kubernetes pod or JSON-RPC daemon), inject files and read them back
//! - **Memorizer**: content-addressed cache of prior outputs keyed by a
//!   canonical hash of each input
//! - **Runner**: one pipeline stage tagged with a priority, wrapped by
//!   composable decorators for success filtering, tracing and priority overrides
//! - **Collector**: one pipeline invocation, with cache short-circuiting and
//!   cache write-back paired by input index
//!
//! ## Feature Flags
//!
//! - `docker`: Docker executor (bollard)
//! - `kubernetes`: Kubernetes executor (kube)
//! - `jsonrpc`: JSON-RPC over WebSocket executor
//! - `redis`: Redis memorizer storage
//! - `disk-cache`: on-disk memorizer storage (cacache)
//!
//! ## Ordering
//!
//! Runners execute in ascending priority: lower values run first, and runners
//! with equal priority keep their registration order. See [`runner::priority`].
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use soar_core::collector::{Collector, CollectorOptions};
//! use soar_core::executor::docker::{DockerExecutor, DockerSettings};
//! use soar_core::memorizer::{HashStrategy, InMemoryStorage, Memorizer};
//! use soar_core::runner::builtin::DnsRunner;
//! use soar_core::runner::RunnerBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn resolve() -> soar_core::Result<()> {
//!     let cancel = CancellationToken::new();
//!     let executor =
//!         DockerExecutor::provision(DockerSettings::new("soar-image:latest"), &cancel).await?;
//!     let memorizer = Memorizer::new(Arc::new(InMemoryStorage::new()), HashStrategy::Asset);
//!
//!     let collector = Collector::new(Arc::new(executor))
//!         .with_memorizer(memorizer)
//!         .with_runner(RunnerBuilder::asset(DnsRunner::default()).build())
//!         .with_options(CollectorOptions { only_success: true, ..Default::default() })
//!         .with_cancellation(cancel);
//!
//!     let collected = collector
//!         .collect_values(vec![serde_json::json!({ "basic": { "domain": "example.com" } })])
//!         .await?;
//!     println!("{} records", collected.outputs.len());
//!     Ok(())
//! }
//! ```
#![allow(missing_docs)]

pub mod collector;
pub mod error;
pub mod executor;
pub mod memorizer;
pub mod runner;

pub use collector::{CollectReport, Collected, Collector, CollectorOptions, StageRecord, StageState};
pub use error::{Result, SoarError};
pub use executor::{ExecOptions, ExecOutput, Executor};
pub use memorizer::{HashStrategy, Memorizer, MemorizerStorage};
pub use runner::{AssetRunner, Runner, RunnerBuilder, RunnerDescriptor};

pub use soar_model as model;

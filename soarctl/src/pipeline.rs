//! Turns a loaded [`Config`] into a ready [`Collector`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use soar_config::{
    Config, ExecutorConfig, KubeConfigRef, MemorizerConfig, RunnerConfig, RunnerKind,
    StorageConfig,
};
use soar_core::executor::docker::{DockerExecutor, DockerSettings};
use soar_core::executor::jsonrpc::{JsonRpcExecutor, JsonRpcSettings};
use soar_core::executor::kubernetes::{
    KubeConfigSource, KubernetesExecutor, KubernetesSettings, ReadinessPolicy,
};
use soar_core::executor::{Executor, TracingExecutor};
use soar_core::memorizer::disk::DiskStorage;
use soar_core::memorizer::redis::RedisStorage;
use soar_core::memorizer::{InMemoryStorage, MemorizerStorage};
use soar_core::runner::builtin::{
    CmdRunner, DEFAULT_UNAUTHOR_CHECK, DnsRunner, HttpxRunner, NaabuRunner, NucleiRunner,
    SubfinderRunner, UnauthorRunner,
};
use soar_core::{Collector, CollectorOptions, Memorizer, Runner, RunnerBuilder};

/// Per-invocation switches layered over the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub debug: bool,
    pub ignore_memorized: bool,
    pub only_success: bool,
}

pub async fn build_collector(
    config: &Config,
    overrides: Overrides,
    cancel: CancellationToken,
) -> Result<Collector> {
    let runners = build_runners(&config.runners, overrides.debug)?;
    let executor = build_executor(&config.executor, overrides.debug, &cancel).await?;

    let mut options = CollectorOptions::from(config.collector);
    options.ignore_memorized |= overrides.ignore_memorized;
    options.only_success |= overrides.only_success;

    let mut collector = Collector::new(executor)
        .with_runners(runners)
        .with_options(options)
        .with_cancellation(cancel);
    if let Some(memorizer) = &config.memorizer {
        collector = collector.with_memorizer(build_memorizer(memorizer).await?);
    }
    Ok(collector)
}

pub async fn build_executor(
    config: &ExecutorConfig,
    debug: bool,
    cancel: &CancellationToken,
) -> Result<Arc<dyn Executor>> {
    let executor: Arc<dyn Executor> = match config {
        ExecutorConfig::Docker(docker) => {
            let settings = DockerSettings {
                host: docker.host.clone(),
                ..DockerSettings::new(&docker.image)
            };
            Arc::new(
                DockerExecutor::provision(settings, cancel)
                    .await
                    .context("failed to provision docker executor")?,
            )
        }
        ExecutorConfig::Kubernetes(kube) => {
            let settings = KubernetesSettings {
                source: match &kube.kubeconfig {
                    KubeConfigRef::Automatic => KubeConfigSource::Automatic,
                    KubeConfigRef::File { path } => KubeConfigSource::File(path.clone()),
                    KubeConfigRef::Content { content } => KubeConfigSource::Content(content.clone()),
                },
                readiness: ReadinessPolicy {
                    poll_interval: kube.readiness.poll_interval,
                    timeout: kube.readiness.timeout,
                },
                ..KubernetesSettings::new(&kube.namespace, &kube.image)
            };
            Arc::new(
                KubernetesExecutor::provision(settings, cancel)
                    .await
                    .context("failed to provision kubernetes executor")?,
            )
        }
        ExecutorConfig::JsonRpc(rpc) => {
            let settings = JsonRpcSettings {
                url: rpc.url.clone(),
                username: rpc.username.clone(),
                password: rpc.password.clone(),
            };
            Arc::new(
                JsonRpcExecutor::connect(settings, cancel)
                    .await
                    .with_context(|| format!("failed to connect to {}", rpc.url))?,
            )
        }
    };
    info!(backend = config.backend(), "executor ready");

    if debug {
        return Ok(Arc::new(TracingExecutor::new(executor)));
    }
    Ok(executor)
}

pub async fn build_memorizer(config: &MemorizerConfig) -> Result<Memorizer> {
    let storage: Arc<dyn MemorizerStorage> = match &config.storage {
        StorageConfig::Memory => Arc::new(InMemoryStorage::new()),
        StorageConfig::Redis { url } => Arc::new(
            RedisStorage::connect(url)
                .await
                .context("failed to connect memorizer to redis")?,
        ),
        StorageConfig::Disk { path } => Arc::new(DiskStorage::new(path)),
    };
    Ok(Memorizer::new(storage, config.strategy)
        .with_namespace(&config.namespace)
        .with_ttl_secs(config.ttl_secs))
}

/// Builds the runner chain in configuration order. The collector sorts it by
/// priority.
pub fn build_runners(configs: &[RunnerConfig], debug: bool) -> Result<Vec<Arc<dyn Runner>>> {
    configs
        .iter()
        .enumerate()
        .map(|(idx, config)| {
            build_runner(config, debug)
                .with_context(|| format!("runners[{idx}] ({})", config.kind.as_str()))
        })
        .collect()
}

fn build_runner(config: &RunnerConfig, debug: bool) -> Result<Arc<dyn Runner>> {
    let settings = config.tool_settings();
    let builder = match config.kind {
        RunnerKind::Subfinder => RunnerBuilder::asset(SubfinderRunner::new(settings)),
        RunnerKind::Dns => RunnerBuilder::asset(DnsRunner::new(settings)),
        RunnerKind::Naabu => RunnerBuilder::asset(NaabuRunner::new(settings)),
        RunnerKind::Httpx => {
            RunnerBuilder::asset(HttpxRunner::new(settings).with_path(config.path.clone()))
        }
        RunnerKind::Nuclei => RunnerBuilder::asset(NucleiRunner::new(settings)),
        RunnerKind::Unauthor => RunnerBuilder::asset(UnauthorRunner::new(
            config.check.as_deref().unwrap_or(DEFAULT_UNAUTHOR_CHECK),
            settings,
        )),
        RunnerKind::Cmd => RunnerBuilder::new(CmdRunner::new(config.cmd.clone(), settings)?),
    };
    Ok(builder
        .only_success(config.only_success)
        .debug(config.debug || debug)
        .priority(config.priority)
        .build())
}

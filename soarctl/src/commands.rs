use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use soar_config::{Config, ConfigLoad, ConfigLoader};
use soar_core::memorizer::{DEFAULT_NAMESPACE, HashStrategy, InMemoryStorage};
use soar_core::model::RunnerData;
use soar_core::{Memorizer, StageState};

use crate::cli::{HashArgs, RunArgs};
use crate::io::{read_inputs, write_json};
use crate::pipeline::{Overrides, build_collector};

pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let loader = match path {
        Some(path) => ConfigLoader::new().with_config_path(path),
        None => ConfigLoader::new(),
    };
    let ConfigLoad {
        config,
        source,
        env_file_loaded,
    } = loader.load().context("failed to load configuration")?;
    if env_file_loaded {
        info!("loaded .env file");
    }
    info!(?source, "configuration source");
    Ok(config)
}

pub async fn run(config: &Config, args: RunArgs, debug: bool, cancel: CancellationToken) -> Result<()> {
    let inputs = read_inputs(&args.input)?;
    if config.runners.is_empty() {
        warn!("no runners configured; inputs pass through unchanged");
    }
    let overrides = Overrides {
        debug,
        ignore_memorized: args.ignore_cache,
        only_success: args.only_success,
    };
    let collector = build_collector(config, overrides, cancel).await?;
    info!(inputs = inputs.len(), ?collector, "starting collect");

    let collected = collector
        .collect_values(inputs)
        .await
        .context("pipeline failed")?;

    for stage in &collected.report.stages {
        if stage.state == StageState::Succeeded {
            info!(
                stage = %stage.name,
                priority = stage.priority,
                inputs = stage.inputs,
                outputs = stage.outputs,
                "stage summary"
            );
        }
    }
    write_json(&collected.outputs, args.output.as_deref())?;
    if let Some(path) = args.report.as_deref() {
        write_json(&collected.report, Some(path))?;
    }
    Ok(())
}

/// The `<namespace>:<hex>` memorizer key of every input, in input order.
pub fn hash(config: &Config, args: HashArgs) -> Result<Vec<String>> {
    let strategy = args
        .strategy
        .map(HashStrategy::from)
        .or_else(|| config.memorizer.as_ref().map(|m| m.strategy))
        .unwrap_or_default();
    let namespace = args
        .namespace
        .or_else(|| config.memorizer.as_ref().map(|m| m.namespace.clone()))
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let memorizer = Memorizer::new(Arc::new(InMemoryStorage::new()), strategy).with_namespace(namespace);
    read_inputs(&args.input)?
        .into_iter()
        .enumerate()
        .map(|(idx, json)| {
            memorizer
                .hash(&RunnerData::new(json, Some(idx)))
                .with_context(|| format!("input #{idx} cannot be hashed"))
        })
        .collect()
}

pub fn render_config(config: &Config) -> Result<String> {
    config.to_toml().context("failed to render configuration")
}

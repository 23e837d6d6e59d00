use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use soar_core::HashStrategy;

#[derive(Parser, Debug)]
#[command(name = "soarctl")]
#[command(version, about = "Run soar recon pipelines against a remote tool executor")]
pub struct Cli {
    /// Configuration file (TOML or JSON). Falls back to SOAR_CONFIG_PATH,
    /// SOAR_CONFIG_JSON, ./soar.toml, then defaults.
    #[arg(long, short, global = true, env = "SOAR_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Trace executor traffic and every runner's payloads.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision the executor and push inputs through the runner chain
    Run(RunArgs),
    /// Print the memorizer key of every input without running anything
    Hash(HashArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON array or JSON lines of assets; `-` reads stdin
    #[arg(long, short, default_value = "-")]
    pub input: String,

    /// Where to write the resulting records; stdout when omitted
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Write the collect report (cache hits, stage states) as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Recompute every input even when a cached result exists
    #[arg(long, default_value_t = false)]
    pub ignore_cache: bool,

    /// Keep only records marked successful
    #[arg(long, default_value_t = false)]
    pub only_success: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HashArgs {
    /// Overrides the configured memorizer strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Overrides the configured key namespace
    #[arg(long)]
    pub namespace: Option<String>,

    /// JSON array or JSON lines of assets; `-` reads stdin
    #[arg(long, short, default_value = "-")]
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Asset,
    General,
}

impl From<StrategyArg> for HashStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Asset => HashStrategy::Asset,
            StrategyArg::General => HashStrategy::General,
        }
    }
}

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soarctl::DEFAULT_LOG_FILTER;
use soarctl::cli::{Cli, Command};
use soarctl::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries results, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config)?;

    match cli.command {
        Command::Run(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; cancelling pipeline");
                    on_signal.cancel();
                }
            });
            commands::run(&config, args, cli.debug, cancel).await
        }
        Command::Hash(args) => {
            for key in commands::hash(&config, args)? {
                println!("{key}");
            }
            Ok(())
        }
        Command::Config => {
            print!("{}", commands::render_config(&config)?);
            Ok(())
        }
    }
}

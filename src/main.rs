use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sandbox_fm::{
    cli::{Cli, Runner},
    config::Config,
};
use sandbox_fm_core::{CancellationToken, FileManager};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = format!("sandbox_fm={0},sandbox_fm_core={0}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    debug!("Configuration loaded: {:?}", config);

    // Override config with CLI arguments
    if let Some(root) = cli.root.clone() {
        config.storage.root = root;
    }

    let manager = FileManager::builder()
        .root(config.storage.root.clone())
        .config(config.manager_config())
        .build()
        .await?;
    info!("Sandbox root: {}", manager.root().display());

    if let Some(cwd) = &cli.cwd {
        manager.navigate_to(cwd).await?;
    }

    // Ctrl-C cancels long-running archive and search jobs
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            signal_token.cancel();
        }
    });

    let runner = Runner::new(manager, config, cli.json, cancel);
    runner.run(cli.command).await
}

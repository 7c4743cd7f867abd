//! sendfile entry point.

mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?.with_overrides(&cli);

    let rt = tokio::runtime::Runtime::new()?;
    match &cli.client {
        Some(path) => rt.block_on(app::run_client(&config, path)),
        None => rt.block_on(app::run_server(&config)),
    }
}

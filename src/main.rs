use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use opfinder::cli_types::{Cli, Commands};
use opfinder::{CliApp, FinderConfig};

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "opfinder=debug" } else { "opfinder=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = FinderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(mode) = cli.mode {
        config.view.default_mode = mode;
    }
    if let Some(keep) = cli.keep {
        config.filter.keep = keep;
    }
    debug!(?config, "effective configuration");

    let mut app = CliApp::new(config, &cli.registry, cli.verbose, !cli.no_color).await?;

    match cli.command {
        Commands::Tree(args) => app.tree(args).await,
        Commands::Search(args) => app.search(args).await,
        Commands::Stats => app.stats().await,
        Commands::Config => app.show_config().await,
    }
}

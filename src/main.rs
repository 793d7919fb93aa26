//! Flagcache CLI entry point.

use anyhow::Context;
use clap::Parser;

use flagcache::cli::commands;
use flagcache::cli::{Cli, Commands};
use flagcache::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli.command, cli.config.as_deref(), cli.json).await {
        flagcache::cli::handle_error(err, cli.json);
    }
}

async fn run(
    command: Commands,
    config_path: Option<&std::path::Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = commands::load_config(config_path)?;

    let log_config = LogConfig::try_from(&config.logging).context("Invalid logging configuration")?;
    let _logger = LoggerImpl::init(&log_config).context("Failed to initialize logging")?;

    match command {
        Commands::Flag(args) => commands::evaluate::execute_flag(args, config, json).await,
        Commands::Flags(args) => commands::evaluate::execute_flags(args, config, json).await,
        Commands::Gate(args) => commands::evaluate::execute_gate(args, config, json).await,
        Commands::Gates(args) => commands::evaluate::execute_gates(args, config, json).await,
        Commands::Track(args) => commands::track::execute(args, config, json).await,
        Commands::Cache(args) => commands::cache::execute(args, config, json).await,
        Commands::Config(args) => commands::config::execute(args, config, json),
    }
}

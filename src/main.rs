//! kvbridge - unified CLI entrypoint.
//!
//! Usage:
//!   kvbridge start [--config kvbridge.toml] [--listen 0.0.0.0:2379]
//!   kvbridge config validate --config kvbridge.toml
//!   kvbridge config show --config kvbridge.toml --format json
//!   kvbridge config generate --output kvbridge.toml

use anyhow::Result;
use clap::Parser;
use kvbridge::cli::commands::{run_config, run_start};
use kvbridge::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => run_start(config_path.as_deref(), cli.log_level, args).await,
        Commands::Config(args) => run_config(config_path.as_deref(), args),
    }
}

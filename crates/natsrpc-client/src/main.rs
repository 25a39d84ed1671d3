//! natsrpc CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use natsrpc_client::cli::{Cli, Command, ConfigAction};
use natsrpc_client::commands;
use natsrpc_client::config::ClientConfig;
use natsrpc_client::error::ClientResult;
use natsrpc_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing = TracingConfig::cli(cli.debug);
    if cli.json_logs {
        tracing = tracing.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let source = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };

    match cli.command {
        Command::Demo(args) => commands::demo::run(&config, args).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &source),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&source),
        },
    }
}

//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// natsrpc - request/reply RPC over publish/subscribe
#[derive(Debug, Parser)]
#[command(name = "natsrpc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "NATSRPC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run responders and the login/register/query flow on an in-memory bus
    Demo(DemoArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options of the `demo` command.
#[derive(Debug, Clone, Args)]
pub struct DemoArgs {
    /// Requestor id (overrides auth.requestor)
    #[arg(long)]
    pub requestor: Option<String>,

    /// Requestor passcode (overrides auth.passcode)
    #[arg(long)]
    pub passcode: Option<String>,

    /// Identity to register (overrides auth.identity)
    #[arg(long)]
    pub identity: Option<String>,

    /// File sent as the registration and query body
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Mode of the resource query
    #[arg(long, default_value = "GET")]
    pub mode: String,

    /// Number of responder workers (overrides server.workers)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Make the resource larger than the maximum payload
    #[arg(long)]
    pub large: bool,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Dump,
    /// Check the configuration and resolve secret references
    Validate,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_demo() {
        let cli = Cli::try_parse_from([
            "natsrpc",
            "--debug",
            "demo",
            "--requestor",
            "alice",
            "--passcode",
            "pw",
            "--mode",
            "POST",
            "--large",
        ])
        .unwrap();
        assert!(cli.debug);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.requestor.as_deref(), Some("alice"));
        assert_eq!(args.mode, "POST");
        assert!(args.large);
        assert_eq!(args.workers, None);
    }

    #[test]
    fn parse_config_path() {
        let cli = Cli::try_parse_from(["natsrpc", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["natsrpc"]).is_err());
    }
}

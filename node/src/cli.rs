//! # CLI Interface
//!
//! Command-line structure for `tokengate-node`, via `clap` derive.
//! Subcommands: `simulate`, `init` and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::logging::LogFormat;

/// Two-chain tokengate simulator.
///
/// Brings up an issuing chain and a counterparty joined by one transfer
/// channel, relays packets between them and runs the compliance scenario.
#[derive(Parser, Debug)]
#[command(
    name = "tokengate-node",
    about = "Compliance-gated cross-chain transfer simulator",
    version,
    propagate_version = true
)]
pub struct TokengateCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "TOKENGATE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reference scenario and print a JSON report.
    Simulate(SimulateArgs),
    /// Write the default network configuration.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Network configuration file (JSON). Built-in defaults when omitted.
    #[arg(long, short = 'c', env = "TOKENGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics after the report.
    #[arg(long)]
    pub metrics: bool,

    /// Print the report on one line.
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the configuration.
    #[arg(long, short = 'o', env = "TOKENGATE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        TokengateCli::command().debug_assert();
    }

    #[test]
    fn simulate_flags_parse() {
        let cli = TokengateCli::try_parse_from([
            "tokengate-node",
            "--log-format",
            "json",
            "simulate",
            "--config",
            "net.json",
            "--metrics",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.config, Some(PathBuf::from("net.json")));
                assert!(args.metrics);
                assert!(!args.compact);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

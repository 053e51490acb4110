// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # tokengate Node
//!
//! Entry point for the `tokengate-node` binary. Parses CLI arguments,
//! initializes logging, and either runs the two-chain scenario or writes a
//! configuration file.
//!
//! - `simulate`: run the reference scenario over the async relayer
//! - `init`: write the default network configuration
//! - `version`: print build version information

mod cli;
mod config;
mod logging;
mod metrics;
mod relayer;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Commands, TokengateCli};
use config::NetworkConfig;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TokengateCli::parse();

    match cli.command {
        Commands::Simulate(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            simulate(args).await
        }
        Commands::Init(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            init(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs the scenario and prints the report (and metrics) to stdout.
async fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => NetworkConfig::load(path)?,
        None => NetworkConfig::default(),
    };
    tracing::info!(
        issuer = %config.issuer.chain_id,
        counterparty = %config.counterparty.chain_id,
        channel = %config.issuer.channel.channel_id,
        "starting simulation"
    );

    let node_metrics = NodeMetrics::new().context("failed to register metrics")?;
    let report = scenario::run(&config, &node_metrics)
        .await
        .context("scenario failed")?;

    let rendered = if args.compact {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .context("failed to encode report")?;
    println!("{rendered}");

    if args.metrics {
        print!("{}", node_metrics.encode()?);
    }
    tracing::info!(relayed = report.relay.packets_relayed, "simulation finished");
    Ok(())
}

/// Writes the default network configuration.
fn init(args: cli::InitArgs) -> Result<()> {
    let path = &args.output;
    anyhow::ensure!(
        args.force || !path.exists(),
        "{} already exists (pass --force to overwrite)",
        path.display()
    );
    NetworkConfig::default().save(path)?;
    tracing::info!(path = %path.display(), "network configuration written");
    println!("Configuration written to {}", path.display());
    Ok(())
}

fn print_version() {
    println!("tokengate-node {}", env!("CARGO_PKG_VERSION"));
    println!(
        "transfer      {} ({})",
        tokengate_protocol::config::TRANSFER_PORT,
        tokengate_protocol::config::ICS20_VERSION
    );
}

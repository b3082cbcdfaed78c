// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Chainform CLI - validate chain declarations and replay cascade scripts

use anyhow::Result;
use chainform::types::ChainContext;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "chainform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,

    /// Branch identifier for remote lookups
    #[arg(long, env = "CHAINFORM_BRANCH")]
    branch: Option<String>,

    /// Client identifier for remote lookups
    #[arg(long, env = "CHAINFORM_CLIENT")]
    client: Option<String>,

    /// Organization identifier for remote lookups
    #[arg(long, env = "CHAINFORM_ORG")]
    org: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a chain-set declaration file
    Validate {
        /// Path to the chain-set TOML file
        chains: std::path::PathBuf,
    },

    /// Replay a script of form operations against a fixture source
    Run {
        /// Path to the chain-set TOML file
        #[arg(long)]
        chains: std::path::PathBuf,

        /// Path to the JSON fixture (options + fill candidates)
        #[arg(long)]
        fixture: std::path::PathBuf,

        /// Path to the JSON op script
        #[arg(long)]
        script: std::path::PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 if cli.quiet => tracing::Level::ERROR,
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Session context: config defaults, overridden by flags/env
    let config = chainform::config::load()?;
    let ctx = ChainContext {
        branch: cli.branch.unwrap_or(config.context.branch),
        client: cli.client.unwrap_or(config.context.client),
        org: cli.org.unwrap_or(config.context.org),
    };

    match cli.command {
        Commands::Validate { chains } => commands::validate::run(&chains),
        Commands::Run {
            chains,
            fixture,
            script,
        } => commands::run::run(&chains, &fixture, &script, ctx, cli.json).await,
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

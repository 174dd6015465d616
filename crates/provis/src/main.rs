use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;
mod summary;

#[derive(Parser)]
#[command(name = "provis")]
#[command(about = "Provis - unattended single-host service provisioning")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        default_value = provis_config::defaults::DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full provisioning pipeline
    Provision {
        /// Auto-affirm the previous-installation cleanup confirmation
        #[arg(long)]
        force: bool,

        /// Suppress prompts and non-essential output
        #[arg(long)]
        quiet: bool,

        /// Disable automatic rollback on failure
        #[arg(long)]
        no_rollback: bool,

        /// Log actions without executing them
        #[arg(long)]
        dry_run: bool,

        /// Anything else; unrecognized flags are ignored
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
        extra: Vec<String>,
    },

    /// Resolve the configuration and detect the platform without mutating anything
    Validate,

    /// Manually reverse the deployed service artifacts
    Rollback {
        /// Log actions without executing them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    smol::block_on(async {
        let cli = Cli::parse();

        match cli.command {
            Commands::Provision {
                force,
                quiet,
                no_rollback,
                dry_run,
                extra,
            } => {
                commands::provision::run(&cli.config, force, quiet, no_rollback, dry_run, extra)
                    .await
            }
            Commands::Validate => commands::validate::run(&cli.config).await,
            Commands::Rollback { dry_run } => commands::rollback::run(&cli.config, dry_run).await,
        }
    })
}

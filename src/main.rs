//! segnas - Main Entry Point
//!
//! Command-line front end for the segmentation architecture search space.

use clap::Parser;
use segnas::cli::{cmd_crossover, cmd_encode, cmd_hash, cmd_mutate, cmd_sample, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segnas=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Sample { count, output_dir } => {
            cmd_sample(&cli, *count, output_dir)?;
        }
        Commands::Mutate { arch, patience, output_dir } => {
            cmd_mutate(&cli, arch, *patience, output_dir)?;
        }
        Commands::Crossover { parent_a, parent_b, patience, output_dir } => {
            cmd_crossover(&cli, parent_a, parent_b, *patience, output_dir)?;
        }
        Commands::Encode { arch } => {
            cmd_encode(&cli, arch)?;
        }
        Commands::Hash { arch } => {
            cmd_hash(&cli, arch)?;
        }
    }

    Ok(())
}

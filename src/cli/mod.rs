//! segnas CLI Module
//!
//! Command-line access to the search space operators: sample, mutate,
//! crossover, encode and hash saved architectures.

use clap::{Parser, Subcommand};
use colored::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::nas::{ArchWithMetadata, SearchSpaceConfig, SegmentationSearchSpace};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString    { s.truecolor(100, 210, 120) }

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

// ─── Arguments ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "segnas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discrete search space for segmentation architecture search")]
#[command(long_about = None)]
pub struct Cli {
    /// Search space configuration (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Random seed
    #[arg(short, long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample random architectures within the MAC bounds
    Sample {
        /// Number of architectures to sample
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Directory to write architectures to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Generate mutated neighbors of an architecture
    Mutate {
        /// Architecture file
        #[arg(short, long)]
        arch: PathBuf,

        /// Maximum number of attempts
        #[arg(short, long, default_value = "20")]
        patience: usize,

        /// Directory to write neighbors to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Recombine two architectures
    Crossover {
        /// First parent file
        #[arg(long)]
        parent_a: PathBuf,

        /// Second parent file
        #[arg(long)]
        parent_b: PathBuf,

        /// Maximum number of splice attempts
        #[arg(short, long, default_value = "10")]
        patience: usize,

        /// Directory to write the child to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Print the surrogate encoding of an architecture
    Encode {
        /// Architecture file
        #[arg(short, long)]
        arch: PathBuf,
    },

    /// Print the archid of an architecture
    Hash {
        /// Architecture file
        #[arg(short, long)]
        arch: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn build_space(config: Option<&Path>) -> anyhow::Result<SegmentationSearchSpace> {
    let config = match config {
        Some(path) => SearchSpaceConfig::from_json_file(path)?,
        None => SearchSpaceConfig::default(),
    };
    Ok(SegmentationSearchSpace::with_defaults(config)?)
}

fn build_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Write `<archid>.json` and `<archid>.meta.json` into `dir`
fn write_arch(dir: &Path, arch: &ArchWithMetadata) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", arch.archid()));
    arch.arch.save_to_file(&path)?;

    let meta_path = dir.join(format!("{}.meta.json", arch.archid()));
    fs::write(&meta_path, serde_json::to_string_pretty(&arch.metadata)?)?;
    Ok(path)
}

fn report(arch: &ArchWithMetadata, path: &Path) {
    step_ok(&format!("{}", path.display()));
    kv("Nodes", &arch.arch.graph().len().to_string());
    if let Some(macs) = arch.metadata.macs {
        kv("MACs", &format!("{:.3e}", macs));
    }
}

pub fn cmd_sample(cli: &Cli, count: usize, output_dir: &Path) -> anyhow::Result<()> {
    section("Sample");
    let space = build_space(cli.config.as_deref())?;
    let mut rng = build_rng(cli.seed);

    let start = Instant::now();
    for _ in 0..count {
        let arch = space.random_sample(&mut rng);
        let path = write_arch(output_dir, &arch)?;
        report(&arch, &path);
    }
    kv("Time", &format!("{:?}", start.elapsed()));
    println!();
    Ok(())
}

pub fn cmd_mutate(cli: &Cli, arch: &Path, patience: usize, output_dir: &Path) -> anyhow::Result<()> {
    section("Mutate");
    let space = build_space(cli.config.as_deref())?;
    let mut rng = build_rng(cli.seed);

    let base = space.load_from_file(arch)?;
    let neighbors = space.get_neighbors(&base, patience, &mut rng);
    if neighbors.is_empty() {
        println!("  {}", "No neighbor found within patience".yellow());
    }
    for nbr in &neighbors {
        let path = write_arch(output_dir, nbr)?;
        report(nbr, &path);
    }
    println!();
    Ok(())
}

pub fn cmd_crossover(
    cli: &Cli,
    parent_a: &Path,
    parent_b: &Path,
    patience: usize,
    output_dir: &Path,
) -> anyhow::Result<()> {
    section("Crossover");
    let space = build_space(cli.config.as_deref())?;
    let mut rng = build_rng(cli.seed);

    let a = space.load_from_file(parent_a)?;
    let b = space.load_from_file(parent_b)?;
    match space.crossover(&a, &b, patience, &mut rng) {
        Some(child) => {
            let path = write_arch(output_dir, &child)?;
            report(&child, &path);
        }
        None => println!("  {}", "No valid splice point within patience".yellow()),
    }
    println!();
    Ok(())
}

pub fn cmd_encode(cli: &Cli, arch: &Path) -> anyhow::Result<()> {
    section("Encode");
    let space = build_space(cli.config.as_deref())?;
    let arch = space.load_from_file(arch)?;
    let repr = space.get_arch_repr(&arch)?;

    kv("Archid", &repr.archid);
    kv("Features", &format!("{} × {}", repr.x.nrows(), repr.x.ncols()));
    kv("Edges", &format!("{:?}", repr.edges));
    println!();
    Ok(())
}

pub fn cmd_hash(cli: &Cli, arch: &Path) -> anyhow::Result<()> {
    let space = build_space(cli.config.as_deref())?;
    let arch = space.load_from_file(arch)?;
    println!("{}", arch.archid());
    Ok(())
}

//! fprint: one-shot access to the fingerprinting core
//!
//! Commands:
//!   hash <file> [--workers N]    - print the parallel SHA-256 fingerprint
//!   sniff <file>                 - check the trailing format signature
//!   ranges <size> [--workers N]  - show how a file of <size> bytes is split
//!   config show                  - display the effective configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use fprint_chunks::{partition, ChunkHasher, SniffError, Sniffer};
use fprint_core::config::FprintConfig;
use fprint_core::{FprintError, FprintResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fprint",
    version,
    about = "Deterministic parallel file fingerprints",
    long_about = "fprint: fingerprint and classify files the same way fprintd does"
)]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "FPRINT_CONFIG",
        default_value = "/etc/fprint/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint a file
    Hash {
        /// File to hash
        file: PathBuf,
        /// Hash workers (default: hash.workers from config)
        #[arg(long, short = 'w')]
        workers: Option<usize>,
    },

    /// Check whether a file ends in the configured signature
    Sniff {
        /// File to check
        file: PathBuf,
    },

    /// Show the per-worker byte ranges for a file size
    Ranges {
        /// File size in bytes
        size: u64,
        /// Hash workers (default: hash.workers from config)
        #[arg(long, short = 'w')]
        workers: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── main ───────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FprintConfig::load_or_default(&cli.config)?;

    let result = match cli.command {
        Commands::Hash { file, workers } => cmd_hash(&file, workers.unwrap_or(config.hash.workers)),
        Commands::Sniff { file } => cmd_sniff(&file, &config),
        Commands::Ranges { size, workers } => {
            cmd_ranges(size, workers.unwrap_or(config.hash.workers))
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config),
        },
    };
    Ok(result?)
}

// ── Commands ───────────────────────────────────────────────────────────────────

fn cmd_hash(file: &Path, workers: usize) -> FprintResult<()> {
    let hasher = ChunkHasher::new(workers)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("hashing {} ({workers} workers)", file.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = hasher.hash_file(file);
    spinner.finish_and_clear();

    let digest = result?;
    println!("{digest}  {}", file.display());
    Ok(())
}

fn cmd_sniff(file: &Path, config: &FprintConfig) -> FprintResult<()> {
    let sniffer = Sniffer::new(config.format.signature_bytes());
    match sniffer.sniff(file) {
        Ok(class) => println!("{}: {class}", file.display()),
        Err(SniffError::TooSmall { size, needed, .. }) => println!(
            "{}: not recognized (only {size} bytes, signature needs {needed})",
            file.display()
        ),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_ranges(size: u64, workers: usize) -> FprintResult<()> {
    if workers == 0 {
        return Err(FprintError::Config("--workers must be at least 1".into()));
    }
    println!("{:>6}  {:>14}  {:>14}  {:>14}", "chunk", "start", "end", "length");
    for r in partition(size, workers) {
        println!(
            "{:>6}  {:>14}  {:>14}  {:>14}",
            r.index,
            r.offset,
            r.end(),
            r.length
        );
    }
    Ok(())
}

fn cmd_config_show(config: &FprintConfig) -> FprintResult<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| FprintError::Config(format!("rendering config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

//! fprintd: stable-file fingerprinting daemon
//!
//! Usage:
//!   fprintd [--config /etc/fprint/config.toml] [--root DIR] [--workers N]
//!
//! Watches one directory, waits for each written file to go quiet, checks
//! its trailing signature, fingerprints it with parallel chunked SHA-256 and
//! hands the fingerprint to the configured registration backend.

mod daemon;
mod metrics;
mod pipeline;
mod register;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use fprint_core::config::FprintConfig;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fprintd", version, about = "Stable-file fingerprinting daemon")]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "FPRINT_CONFIG",
        default_value = "/etc/fprint/config.toml"
    )]
    config: PathBuf,

    /// Directory to watch (overrides watch.root)
    #[arg(long, env = "FPRINT_ROOT")]
    root: Option<PathBuf>,

    /// Hash workers per file (overrides hash.workers)
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Debounce window in milliseconds (overrides watch.debounce_ms)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error); overrides daemon.log_level
    #[arg(long, env = "FPRINT_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides daemon.log_format
    #[arg(long, env = "FPRINT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging so daemon.log_* can take effect
    let config_found = cli.config.exists();
    let mut config = if config_found {
        FprintConfig::from_file(&cli.config)?
    } else {
        FprintConfig::default()
    };

    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli
        .log_format
        .clone()
        .or_else(|| LogFormat::from_str(&config.daemon.log_format, true).ok())
        .unwrap_or(LogFormat::Text);
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "fprintd starting"
    );
    if !config_found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Some(root) = cli.root {
        config.watch.root = root;
    }
    if let Some(workers) = cli.workers {
        config.hash.workers = workers;
    }
    if let Some(ms) = cli.debounce_ms {
        config.watch.debounce_ms = ms;
    }

    daemon::run(config).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

// covercache: background cover texture loader.
// Covers: image crate decode → downscale → GL texture on a shared context,
// bounded MRU cache around a movable center.
// Usage: covercache warm <dir> [--center N]

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

mod cli;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "covercache",
    version = LONG_VERSION,
    about = "Cover texture cache: decode, upload and evict covers around a center"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the order in which positions around a center are loaded
    Order {
        /// Collection size
        #[arg(long, default_value_t = 20)]
        count: usize,
        /// Center rank
        #[arg(long, default_value_t = 0)]
        center: usize,
        /// Cache capacity; marks the picks that fit in one pass
        #[arg(long)]
        capacity: Option<usize>,
    },
    /// Load the covers of a directory on a hidden window and report
    Warm {
        dir: PathBuf,
        /// Center rank
        #[arg(long, default_value_t = 0)]
        center: usize,
        /// Override cache_capacity
        #[arg(long)]
        capacity: Option<usize>,
        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Give up waiting for the pass after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// Show the effective configuration
    Config {
        /// Config file (default: platform config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    match args.command {
        Commands::Order {
            count,
            center,
            capacity,
        } => cli::order(count, center, capacity),
        Commands::Warm {
            dir,
            center,
            capacity,
            config,
            timeout,
        } => cli::warm(&dir, center, capacity, config.as_deref(), timeout),
        Commands::Config { path } => cli::config(path.as_deref()),
    }
}

//! shopsync CLI
//!
//! Command-line trigger for the synchronization engine.
//!
//! # Commands
//!
//! - `run` - Run one synchronization pass (optionally as a dry run)
//! - `watch` - Run passes on an interval until stopped
//! - `status` - Report lease, last run and snapshot statistics

mod client;
mod commands;
mod credentials;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// shopsync command-line tools.
#[derive(Parser)]
#[command(name = "shopsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory (snapshot, lease, audit log)
    #[arg(global = true, short, long, default_value = ".shopsync")]
    data_dir: PathBuf,

    /// Path to the credentials file
    #[arg(global = true, short, long)]
    credentials: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization pass
    Run {
        /// Diff and resolve but apply nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Run passes on an interval until stopped
    Watch {
        /// Seconds between passes
        #[arg(short, long, default_value = "1800")]
        interval: u64,
    },

    /// Report lease, last run and snapshot statistics
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { dry_run } => {
            let credentials = credentials::load(cli.credentials.as_deref())?;
            commands::run::run(&cli.data_dir, &credentials, dry_run)?;
        }
        Commands::Watch { interval } => {
            let credentials = credentials::load(cli.credentials.as_deref())?;
            commands::watch::run(&cli.data_dir, &credentials, interval)?;
        }
        Commands::Status { format } => {
            // Health pings need credentials; without them the report covers
            // the data directory only.
            let credentials = match cli.credentials {
                Some(path) => Some(credentials::load(Some(&path))?),
                None => None,
            };
            commands::status::run(&cli.data_dir, &format, credentials.as_ref())?;
        }
    }

    Ok(())
}

//! tidesync CLI
//!
//! Command-line tools for tidesync change logs.
//!
//! # Commands
//!
//! - `sync` - Run a sync request against a change log
//! - `dump` - Print the changes of one partition
//! - `inspect` - List partitions with change counts and tidemarks
//! - `verify` - Re-read every segment and check frame checksums

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// tidesync command-line tools.
#[derive(Parser)]
#[command(name = "tidesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the change log directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync request and print the response
    Sync {
        /// JSON registry of applications and devices
        #[arg(short, long)]
        registry: PathBuf,

        /// File holding the request body (stdin if omitted)
        #[arg(short = 'i', long)]
        request: Option<PathBuf>,
    },

    /// Print the changes of one partition
    Dump {
        /// Application id
        #[arg(short, long)]
        app: Uuid,

        /// Group name
        #[arg(short, long)]
        group: String,

        /// Only changes after this tidemark
        #[arg(short, long)]
        since: Option<i64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List partitions with change counts and last tidemark
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify segment integrity
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync { registry, request } => {
            let status =
                commands::sync::run(cli.path.as_deref(), &registry, request.as_deref())?;
            if status != 200 {
                return Err(format!("sync request failed with status {status}").into());
            }
        }
        Commands::Dump {
            app,
            group,
            since,
            format,
        } => {
            let path = cli.path.ok_or("Change log path required for dump")?;
            commands::dump::run(&path, app, &group, since, &format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Change log path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Change log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("tidesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Pull page size: {}", tidesync_log::PAGE_SIZE);
        }
    }

    Ok(())
}

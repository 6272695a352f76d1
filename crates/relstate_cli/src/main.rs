//! relstate CLI
//!
//! Command-line tools for relstate snapshots.
//!
//! # Commands
//!
//! - `replay` - Apply an action script to a schema and print the snapshot
//! - `inspect` - Summarize a snapshot file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// relstate command-line tools.
#[derive(Parser)]
#[command(name = "relstate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an action script and print the resulting snapshot
    Replay {
        /// Schema document (JSON)
        #[arg(long)]
        schema: PathBuf,

        /// Action script (JSON array of steps)
        #[arg(long)]
        script: PathBuf,

        /// Starting snapshot (defaults to an empty state)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Mutate in place instead of copying on write
        #[arg(long)]
        bulk: bool,
    },

    /// Summarize a snapshot file
    Inspect {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Schema document to check the snapshot against
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

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
        Commands::Replay {
            schema,
            script,
            snapshot,
            output,
            bulk,
        } => {
            commands::replay::run(&schema, &script, snapshot.as_deref(), output.as_deref(), bulk)?;
        }
        Commands::Inspect {
            snapshot,
            schema,
            format,
        } => {
            commands::inspect::run(&snapshot, schema.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("relstate CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("relstate core v{}", relstate_core::VERSION);
        }
    }

    Ok(())
}

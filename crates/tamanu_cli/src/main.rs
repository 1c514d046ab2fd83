//! Tamanu sync CLI
//!
//! Command-line tools for inspecting the sync metadata of a local Tamanu
//! database dump.
//!
//! # Commands
//!
//! - `inspect` - Per-type sync direction, record count and pending uploads
//! - `pending` - One page of a type's upload candidates, as JSON
//! - `directions` - The catalog and each type's sync direction

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tamanu sync metadata tools.
#[derive(Parser)]
#[command(name = "tamanu-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON dump of the local database
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
    /// Show per-type sync direction, record count and pending uploads
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one page of a type's upload candidates as JSON
    Pending {
        /// The entity type's table
        #[arg(short, long)]
        table: String,

        /// Channel to query; `patient/<id>/<name>` limits to one patient
        #[arg(short, long)]
        channel: Option<String>,

        /// Page size (defaults to the type's upload limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only records with an id after this one
        #[arg(short, long)]
        after: Option<String>,
    },

    /// List the catalog and each type's sync direction
    Directions {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
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
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Dump path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Pending {
            table,
            channel,
            limit,
            after,
        } => {
            let path = cli.path.ok_or("Dump path required for pending")?;
            let channel = channel.unwrap_or_else(|| table.clone());
            commands::pending::run(&path, &table, &channel, limit, after.as_deref())?;
        }
        Commands::Directions { format } => {
            commands::directions::run(&format)?;
        }
        Commands::Version => {
            println!("Tamanu sync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Tamanu core v{}", tamanu_core::VERSION);
        }
    }

    Ok(())
}

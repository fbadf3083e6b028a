//! FIMDB CLI
//!
//! Command-line tools for FIM database files.
//!
//! # Commands
//!
//! - `inspect` - Journal size, record counts and live rows per table
//! - `verify` - Check every journal record's envelope and checksum
//! - `dump` - Print the stored entries
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FIM database tools.
#[derive(Parser)]
#[command(name = "fimdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
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
    /// Display journal statistics and row counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify,

    /// Print stored entries
    Dump {
        /// Only this table (file_entry, registry_key, registry_value)
        #[arg(short, long)]
        table: Option<String>,

        /// Maximum number of entries per table
        #[arg(short, long)]
        limit: Option<usize>,

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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            table,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, table.as_deref(), limit, &format)?;
        }
        Commands::Version => {
            println!("FIMDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("FIMDB Core v{}", fimdb_core::VERSION);
        }
    }

    Ok(())
}

//! bitlog CLI
//!
//! Command-line tools for bitlog store directories.
//!
//! # Commands
//!
//! - `get` / `put` / `delete` - Single-key operations
//! - `compact` - Merge sealed segments
//! - `inspect` - Show every segment file and its contents summary
//! - `verify` - Check that every segment decodes

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// bitlog command-line store tools.
#[derive(Parser)]
#[command(name = "bitlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored under a key
    Get {
        /// Key
        key: String,
    },

    /// Store a value under a key
    Put {
        /// Key
        key: String,
        /// Value
        value: String,
    },

    /// Delete a key
    Delete {
        /// Key
        key: String,
    },

    /// Merge all sealed segments into one
    Compact {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Display every segment without opening the store
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify that every segment decodes
    Verify,

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
        Commands::Get { key } => {
            let path = cli.path.ok_or("Store path required for get")?;
            commands::kv::get(&path, &key)?;
        }
        Commands::Put { key, value } => {
            let path = cli.path.ok_or("Store path required for put")?;
            commands::kv::put(&path, &key, &value)?;
        }
        Commands::Delete { key } => {
            let path = cli.path.ok_or("Store path required for delete")?;
            commands::kv::delete(&path, &key)?;
        }
        Commands::Compact { format } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path, format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("bitlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("bitlog core v{}", bitlog_core::VERSION);
        }
    }

    Ok(())
}

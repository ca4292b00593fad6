//! Corral CLI
//!
//! Command-line tools for inspecting shared Corral stores.
//!
//! # Commands
//!
//! - `nodes` - Display the cluster membership table
//! - `history` - Dump an object's version windows
//! - `verify` - Check store invariants

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Corral command-line store tools.
#[derive(Parser)]
#[command(name = "corral")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store snapshot file
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
    /// Display the cluster membership table
    Nodes {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump an object's version windows
    History {
        /// Object table to read (e.g. obj_dog)
        #[arg(short, long)]
        table: String,

        /// Persistence id of the object (hyphenated uuid)
        #[arg(short, long)]
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check store invariants
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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Nodes { format } => {
            let path = cli.path.ok_or("Store path required for nodes")?;
            commands::nodes::run(&path, &format)?;
        }
        Commands::History { table, id, format } => {
            let path = cli.path.ok_or("Store path required for history")?;
            commands::history::run(&path, &table, &id, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("Corral CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

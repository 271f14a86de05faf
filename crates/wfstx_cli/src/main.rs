//! wfstx CLI
//!
//! Runs transaction and locking scenarios against an in-memory feature
//! service.
//!
//! # Commands
//!
//! - `run` - Execute a scenario script and print each response
//! - `check` - Parse a script and verify its lock bindings

mod commands;
mod script;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Scenario runner for the wfstx engine.
#[derive(Parser)]
#[command(name = "wfstx")]
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
    /// Execute a scenario script
    Run {
        /// Path to the script
        script: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Exit with an error if any step is rejected
        #[arg(short, long)]
        strict: bool,
    },

    /// Parse a scenario script without running it
    Check {
        /// Path to the script
        script: PathBuf,
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
        Commands::Run {
            script,
            format,
            strict,
        } => {
            commands::run::run(&script, &format, strict)?;
        }
        Commands::Check { script } => {
            commands::check::run(&script)?;
        }
        Commands::Version => {
            println!("wfstx CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("wfstx core v{}", wfstx_core::VERSION);
        }
    }

    Ok(())
}

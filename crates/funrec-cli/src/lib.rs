//! funrec CLI Library
//!
//! This crate provides the command-line interface for inspecting feature
//! schemas before a model is trained on them:
//!
//! - **Layout**: which columns of the input buffer each feature occupies
//! - **Names**: the feature names a batch must provide, in column order
//! - **Tables**: the embedding tables the schema creates
//!
//! # Example
//!
//! ```bash
//! # Print the column layout of a schema
//! funrec layout --schema features.json
//!
//! # Same, as JSON
//! FUNREC_FEATURE_SCHEMA=features.json funrec layout --json
//!
//! # Build the embedding tables with a fixed seed
//! funrec tables --schema features.json --seed 7
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{LayoutCommand, NamesCommand, SchemaArgs, TablesCommand};

/// funrec - feature inputs for recommendation models
#[derive(Parser, Debug)]
#[command(name = "funrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the column range of every feature
    Layout(LayoutCommand),

    /// Print the feature names in column order
    Names(NamesCommand),

    /// Build the embedding tables and print their shapes
    Tables(TablesCommand),
}

impl Commands {
    /// Runs the command, writing its report to `out`.
    pub fn run<W: std::io::Write>(&self, out: &mut W) -> CliResult<()> {
        match self {
            Commands::Layout(cmd) => cmd.run(out),
            Commands::Names(cmd) => cmd.run(out),
            Commands::Tables(cmd) => cmd.run(out),
        }
    }
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;

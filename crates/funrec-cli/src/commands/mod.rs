//! CLI Command Implementations
//!
//! - [`layout`]: column ranges of a schema
//! - [`names`]: feature names in column order
//! - [`tables`]: embedding tables a schema creates

mod layout;
mod names;
mod tables;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use funrec_inputs::{FeatureColumn, InputConfig};

pub use layout::LayoutCommand;
pub use names::NamesCommand;
pub use tables::TablesCommand;

/// Schema file selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Path to the JSON feature schema
    #[arg(long, short = 's', env = "FUNREC_FEATURE_SCHEMA")]
    pub schema: PathBuf,
}

impl SchemaArgs {
    /// Loads the schema and validates its feature entries.
    pub fn load(&self) -> Result<(InputConfig, Vec<FeatureColumn>)> {
        let config = InputConfig::from_path(&self.schema)
            .with_context(|| format!("Failed to load schema {}", self.schema.display()))?;
        let columns = config
            .columns()
            .with_context(|| format!("Invalid feature in {}", self.schema.display()))?;
        Ok((config, columns))
    }
}

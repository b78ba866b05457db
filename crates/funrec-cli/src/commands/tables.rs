//! Tables Command Implementation
//!
//! Builds the embedding tables of a schema the same way training would and
//! reports their shapes. Flags override the schema's `tables` section.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use funrec_inputs::build_tables;
use funrec_tensor::Device;
use tracing::info;

use super::SchemaArgs;

/// Build the embedding tables and print their shapes
///
/// # Example
///
/// ```bash
/// funrec tables --schema features.json --linear --seed 7
/// ```
#[derive(Args, Debug, Clone)]
pub struct TablesCommand {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Build single-weight (dim 1) tables
    #[arg(long)]
    pub linear: bool,

    /// Seed for the weight initializer
    #[arg(long)]
    pub seed: Option<u64>,

    /// Standard deviation of the weight initializer
    #[arg(long)]
    pub init_std: Option<f32>,

    /// Target device (cpu, cuda, cuda:N)
    #[arg(long)]
    pub device: Option<Device>,
}

impl TablesCommand {
    /// Prints one line per table to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<()> {
        let (config, columns) = self.schema.load()?;

        let mut options = config.tables;
        options.linear |= self.linear;
        if let Some(seed) = self.seed {
            options.seed = Some(seed);
        }
        if let Some(init_std) = self.init_std {
            options.init_std = init_std;
        }
        if let Some(device) = self.device {
            options.device = device;
        }

        let tables = build_tables(&columns, &options).context("Failed to build embedding tables")?;
        info!(tables = tables.len(), device = %options.device, "tables ready");

        for table in tables.iter() {
            writeln!(
                out,
                "{}  {} x {}  {}{}",
                table.name(),
                table.vocabulary_size(),
                table.dim(),
                table.device(),
                if table.sparse() { "  sparse" } else { "" }
            )?;
        }
        Ok(())
    }
}

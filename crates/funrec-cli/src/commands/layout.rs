//! Layout Command Implementation

use std::io::Write;

use anyhow::Result;
use clap::Args;
use funrec_inputs::build_layout;
use serde_json::json;
use tracing::info;

use super::SchemaArgs;

/// Print the column range of every feature
///
/// # Example
///
/// ```bash
/// funrec layout --schema features.json --json
/// ```
#[derive(Args, Debug, Clone)]
pub struct LayoutCommand {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl LayoutCommand {
    /// Prints the layout to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<()> {
        let (_, columns) = self.schema.load()?;
        let layout = build_layout(&columns)?;
        info!(
            features = layout.len(),
            total_width = layout.total_width(),
            "computed layout"
        );

        if self.json {
            let report = json!({
                "features": layout.iter().collect::<Vec<_>>(),
                "total_width": layout.total_width(),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            return Ok(());
        }

        let width = layout.names().map(str::len).max().unwrap_or(0);
        for entry in layout.iter() {
            writeln!(
                out,
                "{:<width$}  [{}, {})",
                entry.name,
                entry.range.start,
                entry.range.end,
                width = width
            )?;
        }
        writeln!(out, "total_width: {}", layout.total_width())?;
        Ok(())
    }
}

//! Names Command Implementation

use std::io::Write;

use anyhow::Result;
use clap::Args;
use funrec_inputs::get_feature_names;

use super::SchemaArgs;

/// Print the feature names a batch must provide, in column order
#[derive(Args, Debug, Clone)]
pub struct NamesCommand {
    #[command(flatten)]
    pub schema: SchemaArgs,
}

impl NamesCommand {
    /// Prints one name per line to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<()> {
        let (_, columns) = self.schema.load()?;
        for name in get_feature_names(&columns)? {
            writeln!(out, "{}", name)?;
        }
        Ok(())
    }
}

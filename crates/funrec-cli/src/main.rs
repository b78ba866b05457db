//! funrec CLI - inspect feature schemas and the inputs they produce.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funrec_cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("funrec=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "funrec starting");

    let stdout = std::io::stdout();
    cli.command.run(&mut stdout.lock())?;
    Ok(())
}

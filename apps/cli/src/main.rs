//! zivi CLI: search ZiviConnect assignment specifications and export them.
//!
//! Writes search results, optionally enriched with each hit's full record,
//! as JSON or CSV to stdout, a file, or a directory, plus contact cards.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

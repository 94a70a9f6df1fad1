//! seedcrawl CLI — expand seed pages with the pages they link to.
//!
//! Loads seed page records, crawls their outbound links concurrently, and
//! writes the merged, deduplicated page set back to disk.

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

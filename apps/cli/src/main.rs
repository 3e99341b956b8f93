//! askdocs CLI — answer a question against a small set of local documents.
//!
//! Extracts text, splits it into segments, offloads embedding to the worker
//! pool over the message channel, retrieves the relevant segments, and asks
//! the configured model.

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

//! WikiScribe CLI: human-approved publishing of Markdown drafts to Confluence.
//!
//! A draft is opened for review, the reviewer's answer is recorded, and the
//! next review of the same session publishes or rejects it.

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

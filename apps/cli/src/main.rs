//! seoscope CLI: keyword planning, competitor analysis, and content
//! drafting for one seed keyword.
//!
//! The JSON result goes to stdout; logs and progress go to stderr.

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

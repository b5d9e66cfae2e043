//! gitagu CLI binary entry point.
//!
//! Parses command-line arguments with clap, prunes old log files, initializes
//! tracing and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;
mod tui;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;
use crate::logging::LogTargets;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before tracing is up; reports problems on stderr.
    logging::cleanup_old_logs(&cli.log_dir);

    let (file_target, stderr) = cli.log_targets();
    let _guard = logging::init_tracing(
        &cli.log_dir,
        LogTargets {
            file_target: file_target.as_deref(),
            stderr,
        },
    )?;

    cli.run().await
}

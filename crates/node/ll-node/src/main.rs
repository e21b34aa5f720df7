//! Ledgerline node CLI

mod cli;

use crate::cli::CliCommand;
use crate::cli::apply_blocks::{ApplyBlocks, ApplyBlocksError};
use clap::Parser;
use ll_cli_utils::{init_logger, set_exit_on_panic};

/// Node CLI
#[derive(Debug, Parser)]
#[clap(about, version)]
enum Cli {
    /// Apply genesis and a sequence of blocks to a fresh in-memory ledger
    ApplyBlocks(ApplyBlocks),
}

#[derive(Debug, thiserror::Error)]
enum Error {
    /// Apply blocks error
    #[error("Apply blocks error: {0}")]
    ApplyBlocks(#[from] ApplyBlocksError),
}

fn main() -> Result<(), Error> {
    set_exit_on_panic();
    init_logger();

    match Cli::parse() {
        Cli::ApplyBlocks(cmd) => cmd.run(),
    }
}

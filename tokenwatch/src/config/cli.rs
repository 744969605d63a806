use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// Location of config file: Default: tokenwatch.toml
    #[arg(short, long, default_value = "tokenwatch.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Subcommand {
    /// Output example config file.
    Init,

    /// Replay blocks, consume verification notifications and sweep allowances until stopped.
    Index,

    /// Queue a verification notification for a code id from its execute and query schema files.
    Verify {
        code_id: u64,
        execute_schema: PathBuf,
        query_schema: PathBuf,
    },

    /// Zero every allowance that has expired as of the latest indexed block.
    Sweep,

    /// Forget indexed blocks from the given height onward, so they are replayed on the next index run.
    Reindex { blockheight: Option<i64> },

    /// Prints the current version of application
    Version,
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use paramstore::constants::DEFAULT_FRAME_SIZE;

#[derive(Parser)]
#[command(name = "paramstore")]
#[command(about = "Inspect parameter store log files", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Path to the parameter log (a leading ~ is expanded).
    pub(crate) log: PathBuf,

    /// Maximum frame size the log was written with.
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    pub(crate) frame_size: usize,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Summarize the entries stored in the log.
    Stats,

    /// Print stored objects as JSON lines.
    Dump {
        /// Print every entry in file order, including ones reconciliation skips.
        #[arg(long)]
        raw: bool,
    },

    /// Look up a single object.
    Get {
        #[command(subcommand)]
        target: GetTarget,
    },
}

#[derive(Subcommand)]
pub(crate) enum GetTarget {
    /// Parameters by hex id.
    Parameters { id: String },
    /// Parameter set by hex hash.
    Set { hash: String },
}

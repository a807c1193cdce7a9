use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vidsync")]
#[command(about = "Reconcile recorded video folders with their SQLite catalogue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan watched paths, probe durations and store newly found videos
    Sync {
        /// Paths to sync in addition to the configured watch paths
        paths: Vec<PathBuf>,
        /// Reconcile without writing new records to the database
        #[arg(long)]
        no_write_back: bool,
    },
    /// Print the reconciled timeline of one path
    List {
        path: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List folders known to the database
    Folders,
    /// Show what the filename patterns extract from each name
    Parse { names: Vec<String> },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}

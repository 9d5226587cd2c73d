//! CLI argument parsing for rzsync

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rzsync - differential file transfer over HTTP range requests
#[derive(Parser, Debug)]
#[command(name = "rzsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconstruct a file from a control file and local block sources
    Sync(SyncArgs),

    /// Generate a control file for publishing a local file
    Make(MakeArgs),
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Control file location (HTTP(S) URL or local path)
    pub control: String,

    /// Local file to scan for reusable blocks (can be repeated)
    #[arg(short = 'i', long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Output path [default: the Filename advertised by the control file]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Absolute data URL overriding the control file's URL header
    #[arg(short = 'u', long)]
    pub url: Option<String>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Skip the transfer summary
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the make command
#[derive(Parser, Debug)]
pub struct MakeArgs {
    /// File to describe
    pub file: PathBuf,

    /// Output control file path [default: <file>.zsync]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Block size in bytes [default: chosen from the file size]
    #[arg(short = 'b', long)]
    pub block_size: Option<u32>,

    /// URL header value [default: the file name]
    #[arg(short = 'u', long)]
    pub url: Option<String>,

    /// Filename header value [default: the file name]
    #[arg(long)]
    pub filename: Option<String>,
}

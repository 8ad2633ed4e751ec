use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mailblob_types::StoragePolicy;

#[derive(Parser)]
#[command(
    name = "mailblob",
    about = "Content-addressed blob storage for mail payloads",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Blob store configuration file (TOML). Without it, blobs live in
    /// `.mailblob/` under the current directory.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file (or stdin with `-`) and print its blob id
    Save(SaveArgs),
    /// Write a blob to stdout or a file
    Read(ReadArgs),
    /// Delete one blob
    Delete(DeleteArgs),
    /// Delete a bucket and everything in it
    DeleteBucket(DeleteBucketArgs),
    /// List the blobs of a bucket
    List(ListArgs),
}

#[derive(Args)]
pub struct SaveArgs {
    /// Input file, `-` for stdin
    pub input: String,
    #[arg(short, long)]
    pub bucket: Option<String>,
    #[arg(short, long, default_value = "size-based")]
    pub policy: StoragePolicy,
}

#[derive(Args)]
pub struct ReadArgs {
    pub blob_id: String,
    #[arg(short, long)]
    pub bucket: Option<String>,
    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub blob_id: String,
    #[arg(short, long)]
    pub bucket: Option<String>,
}

#[derive(Args)]
pub struct DeleteBucketArgs {
    pub bucket: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short, long)]
    pub bucket: Option<String>,
}

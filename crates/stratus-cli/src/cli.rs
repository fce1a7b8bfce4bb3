use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use stratus_types::ObjectType;

#[derive(Parser)]
#[command(
    name = "stratus",
    about = "Stratus -- object database on a remote blob store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Backend configuration (TOML)
    #[arg(short, long, global = true, default_value = "stratus.toml")]
    pub config: PathBuf,

    /// Raise log verbosity; repeat for more
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as a loose object and print its id
    Put(PutArgs),
    /// Write an object's body to stdout
    Cat(ObjectArgs),
    /// Show an object's type and length
    Header(ObjectArgs),
    /// Check whether an object exists
    Exists(ObjectArgs),
    /// Upload a pack stream
    PushPack(PushPackArgs),
    /// Save the remote ref document to a local JSON file
    RefsExport(RefsArgs),
    /// Publish a local JSON ref document to the remote
    RefsImport(RefsArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub file: PathBuf,
    #[arg(short = 't', long = "type", default_value = "blob")]
    pub object_type: ObjectType,
}

#[derive(Args)]
pub struct ObjectArgs {
    /// Full 64-character hex id
    pub id: String,
}

#[derive(Args)]
pub struct PushPackArgs {
    pub file: PathBuf,
    /// Bytes handed to the backend per chunk
    #[arg(long, default_value_t = 64 * 1024)]
    pub chunk_size: usize,
}

#[derive(Args)]
pub struct RefsArgs {
    pub file: PathBuf,
}

use std::path::PathBuf;

use clap::Parser;

/// Stores files sent over an upgraded control connection.
#[derive(Debug, Parser)]
#[command(name = "sendfile", version, about)]
#[command(after_help = "Examples:\n  \
    sendfile --address unix:/tmp/sendfile\n  \
    sendfile --address unix:/tmp/sendfile --client main.rs")]
pub struct Cli {
    /// Address to listen on or connect to (tcp:<host>:<port> or unix:<path>)
    #[arg(long, visible_alias = "varlink")]
    pub address: Option<String>,

    /// Send FILE to the server instead of running one
    #[arg(long, value_name = "FILE")]
    pub client: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory blobs are stored under
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Largest accepted transfer in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_file_size: Option<u64>,
}

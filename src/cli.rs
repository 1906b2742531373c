//! CLI argument parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "rrfd")]
#[command(author, version, about = "SPI bridge daemon for RRF motion-control firmware", long_about = None)]
pub struct Cli {
    /// Path of the Unix-domain command socket
    #[arg(long)]
    pub socket_path: Option<PathBuf>,

    /// Path to the daemon's TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run against an in-memory loopback instead of real spidev/GPIO hardware
    #[arg(long)]
    pub no_spi: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

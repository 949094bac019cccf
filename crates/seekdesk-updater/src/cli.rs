use std::path::PathBuf;

use clap::Parser;

/// Updates the DeepSeek desktop app from its latest published release.
#[derive(Debug, Parser)]
#[command(name = "seekdesk-updater", version, about)]
pub struct Cli {
    /// Non-interactive mode: never wait for a key press.
    #[arg(long)]
    pub auto: bool,

    /// Verbose logging, mirrored to the terminal.
    #[arg(long)]
    pub debug: bool,

    /// Install directory to update (defaults to the updater's own directory).
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Updater config file (defaults to updater.json in the install directory).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List existing backups, newest first, and exit.
    #[arg(long)]
    pub list_backups: bool,
}

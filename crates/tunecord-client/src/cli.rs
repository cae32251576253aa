//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tunecord - Show what you are listening to as rich presence
#[derive(Debug, Parser)]
#[command(name = "tunecord")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "TUNECORD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Application id sent in the handshake (overrides the config file)
    #[arg(long, env = "TUNECORD_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Directory holding the IPC sockets (overrides the config file)
    #[arg(long, env = "TUNECORD_IPC_DIR")]
    pub ipc_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish snapshots read from stdin, one JSON object per line
    ///
    /// Each line is either a track snapshot such as
    /// `{"title":"Song","artist":"Artist","duration":200,"position":12}`
    /// or `{"clear":true}`.
    Run {
        /// Exit when stdin reaches end of file
        #[arg(long)]
        exit_on_eof: bool,
    },

    /// List IPC endpoints and try a handshake
    Probe {
        /// Seconds to wait for the handshake
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

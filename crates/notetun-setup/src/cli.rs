//! CLI surface: `check`/`create` subcommands for note-pool provisioning,
//! plus a `clash` subcommand for the config generator.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "notetun-setup", about = "Provision the note pool and local config")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Override $NOTETUN_DATA_DIR / ./data for this run.
    #[arg(long, global = true)]
    pub data_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether a note pool exists and the session has access to it.
    Check,
    /// Create a fresh note pool for both roles.
    Create {
        #[arg(long, default_value_t = 100)]
        client_notes: usize,
        #[arg(long, default_value_t = 100)]
        server_notes: usize,
    },
    /// Write a Clash proxy config pointing at this client's HTTP port.
    Clash {
        #[arg(long, default_value_t = 8080)]
        proxy_port: u16,
    },
}

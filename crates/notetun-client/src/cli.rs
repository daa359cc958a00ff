//! CLI surface: a handful of flags overriding file-sourced config, rather
//! than a full argument-driven configuration model (§6.4 keeps config
//! file-only).

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "notetun-client", about = "Covert tunnel client front-end")]
pub struct Cli {
    /// Override $NOTETUN_DATA_DIR / ./data for this run.
    #[arg(long)]
    pub data_dir: Option<std::path::PathBuf>,
}

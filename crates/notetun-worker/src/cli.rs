//! CLI surface, matching `notetun-client`'s minimal override flag.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "notetun-worker", about = "Covert tunnel egress worker")]
pub struct Cli {
    /// Override $NOTETUN_DATA_DIR / ./data for this run.
    #[arg(long)]
    pub data_dir: Option<std::path::PathBuf>,
}

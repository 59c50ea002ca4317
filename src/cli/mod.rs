pub mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::daemon::parse_duration;

#[derive(Parser)]
#[command(name = "postwatch")]
#[command(about = "Watches subreddits for new posts and keeps live statistics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: ~/.config/postwatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll sources and store posts until interrupted
    Run {
        /// Stop after this long (e.g., "30s", "5m", "1h")
        #[arg(short, long, value_parser = parse_duration)]
        duration: Option<Duration>,
    },
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

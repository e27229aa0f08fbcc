//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for sparkplug-monitor.

use clap::Parser;
use std::path::PathBuf;

/// Sparkplug monitor - live topology and telemetry in the terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "sparkplug-monitor")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Backend base URL (overrides settings and SPARKPLUG_MONITOR_URL)
    #[arg(short = 'u', long)]
    pub url: Option<String>,

    /// Bearer token (overrides settings and SPARKPLUG_MONITOR_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Settings file (default: ~/.sparkplug-monitor/settings.toml)
    #[arg(short = 'c', long, env = "SPARKPLUG_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Load the snapshot, print the tree and exit
    #[arg(long, conflicts_with = "replay")]
    pub once: bool,

    /// Replay recorded stream records (JSON lines) instead of connecting
    #[arg(short = 'r', long)]
    pub replay: Option<PathBuf>,

    /// Snapshot (JSON array of groups) to start a replay from
    #[arg(short = 's', long, requires = "replay")]
    pub snapshot: Option<PathBuf>,

    /// Output views as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Also serve the views over HTTP
    #[cfg(feature = "server")]
    #[arg(long)]
    pub serve: bool,

    /// Port for --serve (overrides settings)
    #[cfg(feature = "server")]
    #[arg(short = 'p', long, requires = "serve")]
    pub port: Option<u16>,

    /// Show verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// Whether the views should also be served over HTTP.
    pub fn serve_enabled(&self) -> bool {
        #[cfg(feature = "server")]
        {
            self.serve
        }
        #[cfg(not(feature = "server"))]
        {
            false
        }
    }
}

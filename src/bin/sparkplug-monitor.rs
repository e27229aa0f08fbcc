//! sparkplug-monitor - live Sparkplug topology in the terminal
//!
//! Loads a full snapshot from the backend, then follows its event stream and
//! re-renders the group/node/device/metric tree on every change.
//!
//! # Usage
//!
//! ```bash
//! # Follow the default backend (settings file or http://localhost:8080)
//! ./target/debug/sparkplug-monitor
//!
//! # Print the current tree once and exit
//! ./target/debug/sparkplug-monitor --url http://gateway:8080 --once
//!
//! # JSON lines for scripting
//! ./target/debug/sparkplug-monitor --json | jq .stats
//!
//! # Replay a recorded stream on top of a saved snapshot
//! ./target/debug/sparkplug-monitor --replay events.jsonl --snapshot groups.json
//!
//! # Also serve the views to a browser (requires the `server` feature)
//! ./target/debug/sparkplug-monitor --serve --port 8081
//! ```

use anyhow::Result;
use clap::Parser;

use sparkplug_monitor::cli::{initialize, run_live, run_once, run_replay, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let ctx = initialize(&args).await?;

    if args.once {
        run_once(&ctx).await
    } else if args.replay.is_some() {
        run_replay(&ctx).await
    } else {
        run_live(&ctx).await
    }
}

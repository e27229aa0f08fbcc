//! CLI module - terminal rendering of a live session.
//!
//! ```text
//! +----------------+     +-------------+     +---------------+
//! | Transport      | --> | LiveSession | --> | output.rs     |
//! | (HTTP/replay)  |     | (views)     |     | (text/JSON)   |
//! +----------------+     +-------------+     +---------------+
//!                               |
//!                               +--> server (with --serve)
//! ```

mod args;
mod bootstrap;
mod output;
mod runner;

pub use args::Args;
pub use bootstrap::{initialize, CliContext};
pub use output::{print_view, render_tree, run_view_loop, status_line, view_to_json_line};
pub use runner::{run_live, run_once, run_replay};

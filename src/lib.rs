//! Live topology monitor for Sparkplug-style telemetry.
//!
//! The crate keeps a normalized, incrementally updated snapshot of the
//! `Group -> Node -> Device -> Metric` hierarchy from a snapshot fetch followed
//! by a stream of lifecycle events, and projects it back into a display tree.
//!
//! ```text
//! transport ──► events (validate tag) ──► store (reduce) ──► projection ──► views
//! ```

pub mod error;
pub mod events;
pub mod model;
pub mod projection;
pub mod session;
pub mod settings;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;

pub use error::{MonitorError, Result};
pub use events::{EventRecord, EventType, SparkplugEvent};
pub use projection::{project, TreeEntry};
pub use session::{LiveSession, SessionHandle, SessionView};
pub use store::{reduce, Applied, Store};

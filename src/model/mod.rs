//! Entity model for the Sparkplug topology.
//!
//! Two shapes live here:
//!
//! - **Wire entities** (`Group`, `Node`, `Device`, `Metric` and the nested
//!   `Full*` forms) exactly as the backend serializes them in snapshots and
//!   event payloads.
//! - **Identifier scheme** (`keys`): the composite keys that index the
//!   normalized store and identify rows in the projected tree.

mod entities;
pub mod keys;

pub use entities::{
    DataType, Device, FullDevice, FullGroup, FullNode, Group, Metric, Node,
};
pub use keys::{device_key, metric_key, node_key};

//! Normalized entity store.
//!
//! The store keeps four flat maps keyed by composite id. Parents reference
//! their children by id instead of embedding them, so updating one metric
//! touches exactly one map entry.
//!
//! ```text
//! groups   "G1"          -> { node_ids: {"G1/N1"} }
//! nodes    "G1/N1"       -> { device_ids: {"G1/N1/D1"}, metric_ids: {"G1/N1/7"} }
//! devices  "G1/N1/D1"    -> { metric_ids: {"G1/N1/D1/3"} }
//! metrics  "G1/N1/7"     -> Metric
//!          "G1/N1/D1/3"  -> Metric
//! ```
//!
//! The store is mutated only through [`Store::apply`] (see `reducer`).
//! Entities are never removed: death is a state, not a deletion.

mod reducer;

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Metric;

pub use reducer::{reduce, Applied, IgnoreReason};

/// A group with its node ids
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreGroup {
    pub id: String,
    pub last_message_at: DateTime<Utc>,
    pub node_ids: BTreeSet<String>,
}

/// A node with its device and metric ids
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreNode {
    pub id: String,
    pub group_id: String,
    pub last_message_at: DateTime<Utc>,
    pub online: bool,
    pub device_ids: BTreeSet<String>,
    pub metric_ids: BTreeSet<String>,
}

/// A device with its metric ids
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDevice {
    pub id: String,
    pub node_id: String,
    pub group_id: String,
    pub last_message_at: DateTime<Utc>,
    pub online: bool,
    pub metric_ids: BTreeSet<String>,
}

/// Entity counts for status displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub groups: usize,
    pub nodes: usize,
    pub nodes_online: usize,
    pub devices: usize,
    pub devices_online: usize,
    pub metrics: usize,
    pub metrics_stale: usize,
}

/// The normalized snapshot of the whole topology
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Store {
    pub(crate) groups: HashMap<String, StoreGroup>,
    pub(crate) nodes: HashMap<String, StoreNode>,
    pub(crate) devices: HashMap<String, StoreDevice>,
    pub(crate) metrics: HashMap<String, Metric>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, group_id: &str) -> Option<&StoreGroup> {
        self.groups.get(group_id)
    }

    pub fn node(&self, node_key: &str) -> Option<&StoreNode> {
        self.nodes.get(node_key)
    }

    pub fn device(&self, device_key: &str) -> Option<&StoreDevice> {
        self.devices.get(device_key)
    }

    pub fn metric(&self, metric_key: &str) -> Option<&Metric> {
        self.metrics.get(metric_key)
    }

    /// All groups, sorted by id.
    pub fn groups(&self) -> Vec<&StoreGroup> {
        let mut groups: Vec<_> = self.groups.values().collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of entities of every kind.
    pub fn entity_count(&self) -> usize {
        self.groups.len() + self.nodes.len() + self.devices.len() + self.metrics.len()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            groups: self.groups.len(),
            nodes: self.nodes.len(),
            nodes_online: self.nodes.values().filter(|n| n.online).count(),
            devices: self.devices.len(),
            devices_online: self.devices.values().filter(|d| d.online).count(),
            metrics: self.metrics.len(),
            metrics_stale: self.metrics.values().filter(|m| m.stale).count(),
        }
    }

    /// Check that every child id held by a parent resolves to an entry.
    ///
    /// Returns the dangling ids. Used by tests and debug assertions.
    pub fn dangling_ids(&self) -> Vec<String> {
        let mut dangling = Vec::new();
        for group in self.groups.values() {
            dangling.extend(
                group
                    .node_ids
                    .iter()
                    .filter(|id| !self.nodes.contains_key(*id))
                    .cloned(),
            );
        }
        for node in self.nodes.values() {
            dangling.extend(
                node.device_ids
                    .iter()
                    .filter(|id| !self.devices.contains_key(*id))
                    .cloned(),
            );
            dangling.extend(
                node.metric_ids
                    .iter()
                    .filter(|id| !self.metrics.contains_key(*id))
                    .cloned(),
            );
        }
        for device in self.devices.values() {
            dangling.extend(
                device
                    .metric_ids
                    .iter()
                    .filter(|id| !self.metrics.contains_key(*id))
                    .cloned(),
            );
        }
        dangling
    }
}

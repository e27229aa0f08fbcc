//! Tree projection of the normalized store.
//!
//! [`project`] rebuilds the display hierarchy
//! `Group -> Node -> (Node metrics, Devices) -> Device metrics` from scratch.
//! Each entry carries its composite key as `row_id`, which is stable across
//! rebuilds and unique across the whole forest, and the entity's local id as
//! `id` for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DataType, Metric};
use crate::store::{Store, StoreDevice, StoreNode};

/// Level of an entry in the projected tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Group,
    Node,
    Device,
    Metric,
}

/// Metric fields shown on a leaf row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricView {
    pub name: String,
    pub alias: u64,
    pub data_type: DataType,
    pub value: serde_json::Value,
    pub is_null: bool,
}

/// One row of the projected tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    /// Composite key, unique across the forest
    pub row_id: String,
    /// Local id. Metrics use their alias.
    pub id: String,
    pub kind: EntryKind,
    /// `None` for groups, `!stale` for metrics
    pub online: Option<bool>,
    pub last_message_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

impl TreeEntry {
    /// Number of entries in this subtree, including itself.
    pub fn entry_count(&self) -> usize {
        1 + self.children.iter().map(TreeEntry::entry_count).sum::<usize>()
    }

    /// Depth-first iterator over this subtree.
    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let entry = stack.pop()?;
            stack.extend(entry.children.iter().rev());
            Some(entry)
        })
    }
}

/// Build the display forest from `store`.
///
/// Groups are sorted by id. Under a node, its metrics (by alias) come before
/// its devices (by id). Device metrics are sorted by alias.
pub fn project(store: &Store) -> Vec<TreeEntry> {
    store
        .groups()
        .into_iter()
        .map(|group| {
            let mut nodes: Vec<&StoreNode> =
                group.node_ids.iter().filter_map(|id| store.node(id)).collect();
            nodes.sort_by(|a, b| a.id.cmp(&b.id));

            TreeEntry {
                row_id: group.id.clone(),
                id: group.id.clone(),
                kind: EntryKind::Group,
                online: None,
                last_message_at: group.last_message_at,
                metric: None,
                children: nodes
                    .into_iter()
                    .map(|node| project_node(store, group.id.as_str(), node))
                    .collect(),
            }
        })
        .collect()
}

fn project_node(store: &Store, group_id: &str, node: &StoreNode) -> TreeEntry {
    let row_id = crate::model::node_key(group_id, &node.id);

    let mut children = project_metrics(store, node.metric_ids.iter());

    let mut devices: Vec<(&String, &StoreDevice)> = node
        .device_ids
        .iter()
        .filter_map(|key| store.device(key).map(|device| (key, device)))
        .collect();
    devices.sort_by(|a, b| a.1.id.cmp(&b.1.id));
    children.extend(
        devices
            .into_iter()
            .map(|(key, device)| project_device(store, key, device)),
    );

    TreeEntry {
        row_id,
        id: node.id.clone(),
        kind: EntryKind::Node,
        online: Some(node.online),
        last_message_at: node.last_message_at,
        metric: None,
        children,
    }
}

fn project_device(store: &Store, key: &str, device: &StoreDevice) -> TreeEntry {
    TreeEntry {
        row_id: key.to_string(),
        id: device.id.clone(),
        kind: EntryKind::Device,
        online: Some(device.online),
        last_message_at: device.last_message_at,
        metric: None,
        children: project_metrics(store, device.metric_ids.iter()),
    }
}

fn project_metrics<'a>(store: &Store, ids: impl Iterator<Item = &'a String>) -> Vec<TreeEntry> {
    let mut metrics: Vec<(&String, &Metric)> = ids
        .filter_map(|key| store.metric(key).map(|metric| (key, metric)))
        .collect();
    metrics.sort_by_key(|(_, metric)| metric.alias);
    metrics
        .into_iter()
        .map(|(key, metric)| project_metric(key, metric))
        .collect()
}

fn project_metric(key: &str, metric: &Metric) -> TreeEntry {
    TreeEntry {
        row_id: key.to_string(),
        id: metric.alias.to_string(),
        kind: EntryKind::Metric,
        online: Some(!metric.stale),
        last_message_at: metric.timestamp,
        metric: Some(MetricView {
            name: metric.name.clone(),
            alias: metric.alias,
            data_type: metric.data_type,
            value: metric.value.clone(),
            is_null: metric.is_null,
        }),
        children: Vec::new(),
    }
}

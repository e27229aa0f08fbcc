//! Wire entities as served by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::{device_key, node_key};

// ============================================================================
// Enums
// ============================================================================

/// Sparkplug metric data type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Boolean,
    String,
    Text,
    #[serde(rename = "UUID")]
    Uuid,
    /// Any type this consumer does not know yet
    #[default]
    #[serde(other)]
    Unknown,
}

impl DataType {
    /// Whether values of this type are JSON numbers.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float
                | DataType::Double
        )
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Top-level namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub last_message_at: DateTime<Utc>,
}

/// A protocol endpoint under a group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub group_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_message_at: DateTime<Utc>,
}

impl Node {
    /// Composite key of this node.
    pub fn key(&self) -> String {
        node_key(&self.group_id, &self.id)
    }
}

/// A sub-endpoint under a node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub node_id: String,
    pub group_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_message_at: DateTime<Utc>,
}

impl Device {
    /// Composite key of this device.
    pub fn key(&self) -> String {
        device_key(&self.group_id, &self.node_id, &self.id)
    }
}

/// A named, typed datum owned by one node or one device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub name: String,
    pub alias: u64,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_null: bool,
    #[serde(default)]
    pub value: serde_json::Value,
}

// ============================================================================
// Nested snapshot forms
// ============================================================================

/// A group with its full subtree, as returned by the snapshot endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullGroup {
    pub id: String,
    #[serde(default)]
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: Vec<FullNode>,
}

/// A node with its devices and metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullNode {
    pub id: String,
    pub group_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub devices: Vec<FullDevice>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// A device with its metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullDevice {
    pub id: String,
    pub node_id: String,
    pub group_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

//! Event taxonomy for the live update stream.
//!
//! Every inbound stream record is an envelope `{ type, timestamp, data }`.
//! The `type` tag is validated against the closed [`EventType`] set before
//! `data` is decoded into the tag's payload, so a backend that starts
//! emitting new tags degrades to logged no-ops instead of failures.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Device, FullGroup, Metric, Node};

// ============================================================================
// Tags
// ============================================================================

/// The seven lifecycle tags this consumer understands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Initial,
    NBirth,
    NData,
    NDeath,
    DBirth,
    DData,
    DDeath,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Initial,
        EventType::NBirth,
        EventType::NData,
        EventType::NDeath,
        EventType::DBirth,
        EventType::DData,
        EventType::DDeath,
    ];

    /// Wire tag of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Initial => "INITIAL",
            EventType::NBirth => "NBIRTH",
            EventType::NData => "NDATA",
            EventType::NDeath => "NDEATH",
            EventType::DBirth => "DBIRTH",
            EventType::DData => "DDATA",
            EventType::DDeath => "DDEATH",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EnvelopeError::UnknownType(s.to_string()))
    }
}

/// Whether `tag` is one of the seven known event tags.
pub fn is_valid_event_type(tag: &str) -> bool {
    tag.parse::<EventType>().is_ok()
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitialEvent {
    pub groups: Vec<FullGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeBirthEvent {
    pub node: Node,
    #[serde(default)]
    pub node_metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDataEvent {
    pub node: Node,
    #[serde(default)]
    pub node_metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeathEvent {
    pub node: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBirthEvent {
    pub node: Node,
    pub device: Device,
    #[serde(default)]
    pub device_metrics: Vec<Metric>,
}

/// Device data. The `device` field is required so every ancestor can be
/// verified before metrics are touched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDataEvent {
    pub node: Node,
    pub device: Device,
    #[serde(default)]
    pub device_metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDeathEvent {
    pub node: Node,
    pub device: Device,
}

/// A decoded, validated event
#[derive(Debug, Clone, PartialEq)]
pub enum SparkplugEvent {
    Initial(InitialEvent),
    NodeBirth(NodeBirthEvent),
    NodeData(NodeDataEvent),
    NodeDeath(NodeDeathEvent),
    DeviceBirth(DeviceBirthEvent),
    DeviceData(DeviceDataEvent),
    DeviceDeath(DeviceDeathEvent),
}

impl SparkplugEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SparkplugEvent::Initial(_) => EventType::Initial,
            SparkplugEvent::NodeBirth(_) => EventType::NBirth,
            SparkplugEvent::NodeData(_) => EventType::NData,
            SparkplugEvent::NodeDeath(_) => EventType::NDeath,
            SparkplugEvent::DeviceBirth(_) => EventType::DBirth,
            SparkplugEvent::DeviceData(_) => EventType::DData,
            SparkplugEvent::DeviceDeath(_) => EventType::DDeath,
        }
    }

    /// The node this event refers to, if any.
    pub fn node(&self) -> Option<&Node> {
        match self {
            SparkplugEvent::Initial(_) => None,
            SparkplugEvent::NodeBirth(e) => Some(&e.node),
            SparkplugEvent::NodeData(e) => Some(&e.node),
            SparkplugEvent::NodeDeath(e) => Some(&e.node),
            SparkplugEvent::DeviceBirth(e) => Some(&e.node),
            SparkplugEvent::DeviceData(e) => Some(&e.node),
            SparkplugEvent::DeviceDeath(e) => Some(&e.node),
        }
    }

    /// The device this event refers to, if any.
    pub fn device(&self) -> Option<&Device> {
        match self {
            SparkplugEvent::DeviceBirth(e) => Some(&e.device),
            SparkplugEvent::DeviceData(e) => Some(&e.device),
            SparkplugEvent::DeviceDeath(e) => Some(&e.device),
            _ => None,
        }
    }

    /// Number of metrics carried by this event.
    pub fn metric_count(&self) -> usize {
        match self {
            SparkplugEvent::Initial(e) => e
                .groups
                .iter()
                .flat_map(|g| &g.nodes)
                .map(|n| {
                    let device_metrics: usize = n.devices.iter().map(|d| d.metrics.len()).sum();
                    n.metrics.len() + device_metrics
                })
                .sum(),
            SparkplugEvent::NodeBirth(e) => e.node_metrics.len(),
            SparkplugEvent::NodeData(e) => e.node_metrics.len(),
            SparkplugEvent::DeviceBirth(e) => e.device_metrics.len(),
            SparkplugEvent::DeviceData(e) => e.device_metrics.len(),
            SparkplugEvent::NodeDeath(_) | SparkplugEvent::DeviceDeath(_) => 0,
        }
    }

    /// Payload as JSON, the `data` field of the envelope.
    fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            SparkplugEvent::Initial(e) => serde_json::to_value(e),
            SparkplugEvent::NodeBirth(e) => serde_json::to_value(e),
            SparkplugEvent::NodeData(e) => serde_json::to_value(e),
            SparkplugEvent::NodeDeath(e) => serde_json::to_value(e),
            SparkplugEvent::DeviceBirth(e) => serde_json::to_value(e),
            SparkplugEvent::DeviceData(e) => serde_json::to_value(e),
            SparkplugEvent::DeviceDeath(e) => serde_json::to_value(e),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Reasons an inbound record is discarded before reaching the reducer
#[derive(Debug, Error, PartialEq)]
pub enum EnvelopeError {
    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid {event_type} payload: {message}")]
    InvalidPayload {
        event_type: EventType,
        message: String,
    },
}

/// The envelope as it arrives, before tag validation
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    data: serde_json::Value,
}

/// A validated event with its envelope timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event: SparkplugEvent,
}

impl EventRecord {
    pub fn new(timestamp: DateTime<Utc>, event: SparkplugEvent) -> Self {
        Self { timestamp, event }
    }

    /// Wrap a snapshot as an `INITIAL` record stamped now.
    pub fn initial(groups: Vec<FullGroup>) -> Self {
        Self::new(Utc::now(), SparkplugEvent::Initial(InitialEvent { groups }))
    }

    /// Parse and validate one stream record.
    ///
    /// Records without a timestamp are stamped with the time of receipt.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: RawEnvelope =
            serde_json::from_str(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let event_type: EventType = envelope.event_type.parse()?;
        let data = envelope.data;

        let event = match event_type {
            EventType::Initial => SparkplugEvent::Initial(decode(event_type, data)?),
            EventType::NBirth => SparkplugEvent::NodeBirth(decode(event_type, data)?),
            EventType::NData => SparkplugEvent::NodeData(decode(event_type, data)?),
            EventType::NDeath => SparkplugEvent::NodeDeath(decode(event_type, data)?),
            EventType::DBirth => SparkplugEvent::DeviceBirth(decode(event_type, data)?),
            EventType::DData => SparkplugEvent::DeviceData(decode(event_type, data)?),
            EventType::DDeath => SparkplugEvent::DeviceDeath(decode(event_type, data)?),
        };

        Ok(Self {
            timestamp: envelope.timestamp.unwrap_or_else(Utc::now),
            event,
        })
    }

    /// Serialize back into the wire envelope.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "type": self.event.event_type().as_str(),
            "timestamp": self.timestamp,
            "data": self.event.payload_json()?,
        }))
    }
}

/// Decode the `data` field into the payload of `event_type`.
fn decode<T: DeserializeOwned>(
    event_type: EventType,
    data: serde_json::Value,
) -> Result<T, EnvelopeError> {
    serde_json::from_value(data).map_err(|e| EnvelopeError::InvalidPayload {
        event_type,
        message: e.to_string(),
    })
}

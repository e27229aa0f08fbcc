//! Bounded audit log of received messages.
//!
//! Entries are stamped with the local time of receipt and kept ordered by
//! it. The backend's own envelope time is carried alongside as `timestamp`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{EventRecord, EventType};

/// One received message, as listed in the audit log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Local time the record was received
    pub received_at: DateTime<Utc>,
    /// Envelope timestamp set by the backend
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub group_id: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub metric_amount: usize,
}

impl MessageRecord {
    /// Summarize a validated record received at `received_at`.
    /// Snapshots carry no group or node.
    pub fn from_event(record: &EventRecord, received_at: DateTime<Utc>) -> Self {
        let node = record.event.node();
        Self {
            received_at,
            timestamp: record.timestamp,
            event_type: record.event.event_type(),
            group_id: node.map(|n| n.group_id.clone()).unwrap_or_default(),
            node_id: node.map(|n| n.id.clone()).unwrap_or_default(),
            device_id: record.event.device().map(|d| d.id.clone()),
            metric_amount: record.event.metric_count(),
        }
    }
}

/// Fixed-capacity log; the oldest record is evicted first
#[derive(Debug, Clone)]
pub struct MessageLog {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append `record`. A receipt time earlier than the newest entry (local
    /// clock stepped back) is raised to it so the log stays ordered.
    pub fn push(&mut self, mut record: MessageRecord) {
        if self.capacity == 0 {
            return;
        }
        if let Some(last) = self.records.back() {
            record.received_at = record.received_at.max(last.received_at);
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records in receipt order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<MessageRecord> {
        self.records.iter().cloned().collect()
    }
}

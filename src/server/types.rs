//! Response types for the view server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::MessageRecord;
use crate::store::StoreStats;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" while the session is live, "closed" after teardown
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
    /// Entity counts of the latest view
    pub stats: StoreStats,
    /// When the latest view was published
    pub updated_at: DateTime<Utc>,
}

impl HealthResponse {
    pub fn new(closed: bool, stats: StoreStats, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: if closed { "closed" } else { "ok" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            stats,
            updated_at,
        }
    }
}

/// Message log listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesResponse {
    pub data: Vec<MessageRecord>,
    pub count: usize,
}

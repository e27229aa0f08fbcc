//! Settings schema definitions for the monitor.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it changes.

use serde::{Deserialize, Serialize};

/// Backend used when neither the settings file nor the environment names one
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Root settings structure.
///
/// Loaded from `~/.sparkplug-monitor/settings.toml` with environment variable
/// interpolation support. Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    /// Settings file format version
    pub version: u32,

    /// Backend endpoints
    pub backend: BackendSettings,

    /// Live session behavior
    pub session: SessionSettings,

    /// View server (only used with the `server` feature)
    pub server: ServerSettings,

    /// Log filtering
    pub logging: LoggingSettings,
}

/// Where snapshots and the event stream come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the backend (supports $ENV_VAR syntax).
    /// Unset means `SPARKPLUG_MONITOR_URL`, then [`DEFAULT_BASE_URL`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Path of the full snapshot endpoint, appended to `base_url`
    pub snapshot_path: String,

    /// Path of the SSE event stream, appended to `base_url`
    pub stream_path: String,

    /// Bearer token sent with every request (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

/// Live session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// Number of received messages kept for the audit log
    pub message_log_capacity: usize,
}

/// View server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            version: 1,
            backend: BackendSettings::default(),
            session: SessionSettings::default(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            snapshot_path: "/api/groups".to_string(),
            stream_path: "/api/groups/stream".to_string(),
            bearer_token: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            message_log_capacity: 1000,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8081,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "sparkplug_monitor=info".to_string(),
        }
    }
}

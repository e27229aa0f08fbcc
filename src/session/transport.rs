//! Transport seam between the session and the backend.
//!
//! A [`Transport`] provides the two asynchronous boundaries of a session: one
//! snapshot fetch and one long-lived stream of raw message payloads. The
//! session never sees HTTP or SSE framing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use sparkplug_sse::Client;

use crate::error::{MonitorError, Result};
use crate::model::FullGroup;
use crate::settings::{get_with_env_fallback, resolve_base_url, BackendSettings, TOKEN_ENV_VARS};

/// Raw message payloads as they come off the wire.
pub type RawMessageStream = BoxStream<'static, Result<String>>;

/// Source of snapshots and live messages
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the full entity graph.
    async fn fetch_snapshot(&self) -> Result<Vec<FullGroup>>;

    /// Open the push channel. Each item is one message payload.
    async fn subscribe(&self) -> Result<RawMessageStream>;
}

// ============================================================================
// HTTP + SSE
// ============================================================================

/// Transport backed by a snapshot endpoint and an SSE endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    snapshot_path: String,
    stream_path: String,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        snapshot_path: impl Into<String>,
        stream_path: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::new(base_url)?,
            snapshot_path: snapshot_path.into(),
            stream_path: stream_path.into(),
        })
    }

    /// Build from backend settings. URL and bearer token fall back to the environment.
    pub fn from_settings(backend: &BackendSettings) -> Result<Self> {
        let mut transport = Self::new(
            &resolve_base_url(backend),
            backend.snapshot_path.clone(),
            backend.stream_path.clone(),
        )?;
        if let Some(token) = get_with_env_fallback(&backend.bearer_token, TOKEN_ENV_VARS, None) {
            transport = transport.with_bearer_token(token);
        }
        Ok(transport)
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.client = self.client.with_bearer_token(token);
        self
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url().as_str()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_snapshot(&self) -> Result<Vec<FullGroup>> {
        Ok(self.client.get_json(&self.snapshot_path).await?)
    }

    async fn subscribe(&self) -> Result<RawMessageStream> {
        let stream = self.client.open_stream(&self.stream_path).await?;
        Ok(stream
            .map(|message| message.map(|m| m.data).map_err(MonitorError::from))
            .boxed())
    }
}

// ============================================================================
// Recorded
// ============================================================================

/// Transport that replays a fixed snapshot and a finite list of messages
///
/// Each call to `subscribe` hands out the recorded messages once; later
/// subscriptions see an empty stream.
pub struct RecordedTransport {
    snapshot: Vec<FullGroup>,
    messages: Mutex<Option<Vec<String>>>,
    hold_open: bool,
    snapshot_error: Option<String>,
}

impl RecordedTransport {
    pub fn new(snapshot: Vec<FullGroup>, messages: Vec<String>) -> Self {
        Self {
            snapshot,
            messages: Mutex::new(Some(messages)),
            hold_open: false,
            snapshot_error: None,
        }
    }

    /// Load a JSON snapshot file and a JSON-lines message file.
    ///
    /// Blank lines and lines starting with `#` in the message file are skipped.
    /// Without a snapshot file the snapshot is empty.
    pub fn from_files(snapshot: Option<&Path>, messages: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let groups = match snapshot {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read snapshot {:?}", path))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Invalid snapshot JSON in {:?}", path))?
            }
            None => Vec::new(),
        };

        let contents = std::fs::read_to_string(messages)
            .with_context(|| format!("Failed to read messages {:?}", messages))?;
        let lines = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();

        Ok(Self::new(groups, lines))
    }

    /// Keep the stream pending after the last message instead of ending it.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Make every snapshot fetch fail with a transport error.
    pub fn failing_snapshot(mut self, message: impl Into<String>) -> Self {
        self.snapshot_error = Some(message.into());
        self
    }

    pub fn into_shared(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for RecordedTransport {
    async fn fetch_snapshot(&self) -> Result<Vec<FullGroup>> {
        match &self.snapshot_error {
            Some(message) => Err(MonitorError::Transport(message.clone())),
            None => Ok(self.snapshot.clone()),
        }
    }

    async fn subscribe(&self) -> Result<RawMessageStream> {
        let messages = self.messages.lock().await.take().unwrap_or_default();
        let recorded = stream::iter(messages.into_iter().map(Ok));
        if self.hold_open {
            Ok(recorded.chain(stream::pending()).boxed())
        } else {
            Ok(recorded.boxed())
        }
    }
}

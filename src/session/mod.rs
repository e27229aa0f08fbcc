//! Live update session.
//!
//! A session owns one [`Store`] and drives it through two sequenced phases:
//!
//! ```text
//! bootstrap:  Transport::fetch_snapshot ──► INITIAL ──► Store
//! streaming:  Transport::subscribe ──► Subscription ──► Store::apply ──► project
//!                                                                         │
//!                                               watch::Sender<SessionView>◄┘
//! ```
//!
//! Streaming cannot start before bootstrap succeeded, so no incremental event
//! is ever applied to an empty store. Readers hold a [`SessionHandle`] and only
//! ever see published views; the store itself never leaves the session.

mod message_log;
mod subscription;
mod transport;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::events::EventRecord;
use crate::projection::{project, TreeEntry};
use crate::settings::SessionSettings;
use crate::store::{Applied, Store, StoreStats};

pub use message_log::{MessageLog, MessageRecord};
pub use subscription::Subscription;
pub use transport::{HttpTransport, RawMessageStream, RecordedTransport, Transport};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of messages kept in the audit log
    pub message_log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            message_log_capacity: settings.message_log_capacity,
        }
    }
}

/// Read-only export of the session state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub tree: Arc<Vec<TreeEntry>>,
    pub messages: Arc<Vec<MessageRecord>>,
    pub stats: StoreStats,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    fn empty() -> Self {
        Self {
            tree: Arc::new(Vec::new()),
            messages: Arc::new(Vec::new()),
            stats: StoreStats::default(),
            updated_at: Utc::now(),
        }
    }
}

/// Cloneable reader side of a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
    views: watch::Receiver<SessionView>,
}

impl SessionHandle {
    /// Latest published view.
    pub fn current(&self) -> SessionView {
        self.views.borrow().clone()
    }

    /// A fresh receiver for view updates.
    pub fn views(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }

    /// Tear the session down. A running `run()` returns shortly after.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

/// One bootstrap + streaming lifetime over a transport
pub struct LiveSession {
    id: Uuid,
    transport: Arc<dyn Transport>,
    store: Store,
    log: MessageLog,
    tree: Arc<Vec<TreeEntry>>,
    bootstrapped: bool,
    streaming: bool,
    cancel: CancellationToken,
    view_tx: watch::Sender<SessionView>,
}

impl LiveSession {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let (view_tx, _) = watch::channel(SessionView::empty());
        let id = Uuid::new_v4();
        tracing::info!("[session] {} created", id);

        Self {
            id,
            transport,
            store: Store::new(),
            log: MessageLog::new(config.message_log_capacity),
            tree: Arc::new(Vec::new()),
            bootstrapped: false,
            streaming: false,
            cancel: CancellationToken::new(),
            view_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: self.cancel.clone(),
            views: self.view_tx.subscribe(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    pub fn view(&self) -> SessionView {
        self.view_tx.borrow().clone()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Load the full snapshot and apply it as `INITIAL`.
    ///
    /// Runs at most once successfully; later calls return `Ok(false)`. A
    /// failed fetch leaves the session unbootstrapped so it can be retried.
    pub async fn bootstrap(&mut self) -> Result<bool> {
        if self.is_closed() {
            return Err(MonitorError::Closed);
        }
        if self.bootstrapped {
            tracing::debug!("[session] {} already bootstrapped", self.id);
            return Ok(false);
        }

        let groups = tokio::select! {
            _ = self.cancel.cancelled() => return Err(MonitorError::Closed),
            groups = self.transport.fetch_snapshot() => groups?,
        };
        tracing::info!("[session] {} bootstrapped with {} groups", self.id, groups.len());

        self.apply(&EventRecord::initial(groups));
        self.bootstrapped = true;
        Ok(true)
    }

    /// Open the live stream. Requires a completed bootstrap.
    pub async fn subscribe(&mut self) -> Result<Subscription> {
        if self.is_closed() {
            return Err(MonitorError::Closed);
        }
        if !self.bootstrapped {
            return Err(MonitorError::NotBootstrapped);
        }
        if self.streaming {
            return Err(MonitorError::AlreadyStreaming);
        }

        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return Err(MonitorError::Closed),
            stream = self.transport.subscribe() => stream?,
        };
        self.streaming = true;
        tracing::info!("[session] {} streaming", self.id);
        Ok(Subscription::new(stream, self.cancel.child_token()))
    }

    /// Apply one validated record and publish the resulting view.
    ///
    /// Returns `None` when the session is closed and the record was dropped.
    pub fn apply(&mut self, record: &EventRecord) -> Option<Applied> {
        if self.is_closed() {
            tracing::debug!(
                "[session] {} closed, dropping {}",
                self.id,
                record.event.event_type()
            );
            return None;
        }

        let applied = self.store.apply(record);
        self.log.push(MessageRecord::from_event(record, Utc::now()));
        if applied.is_changed() {
            self.tree = Arc::new(project(&self.store));
        }
        self.publish();
        Some(applied)
    }

    fn publish(&self) {
        self.view_tx.send_replace(SessionView {
            tree: Arc::clone(&self.tree),
            messages: Arc::new(self.log.to_vec()),
            stats: self.store.stats(),
            updated_at: Utc::now(),
        });
    }

    /// Bootstrap, then apply streamed events until the stream ends or the
    /// session is closed.
    ///
    /// Transport failures end the loop with an error. The last published view
    /// stays available to every handle.
    pub async fn run(&mut self) -> Result<()> {
        self.bootstrap().await?;
        let mut subscription = self.subscribe().await?;

        while let Some(item) = subscription.next_event().await {
            let record = item?;
            self.apply(&record);
        }

        tracing::info!(
            "[session] {} stream finished ({} received, {} discarded)",
            self.id,
            subscription.received(),
            subscription.discarded()
        );
        Ok(())
    }

    /// Tear down the session and release the stream.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("[session] {} closing", self.id);
        }
        self.cancel.cancel();
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FullGroup;
    use crate::store::IgnoreReason;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use serde_json::json;

    fn snapshot() -> Vec<FullGroup> {
        serde_json::from_value(json!([{
            "id": "G1",
            "lastMessageAt": "2024-03-01T10:00:00Z",
            "nodes": [{
                "id": "N1", "groupId": "G1", "online": true,
                "lastMessageAt": "2024-03-01T10:00:00Z",
                "metrics": [{ "name": "temp", "alias": 7, "dataType": "Double",
                              "timestamp": "2024-03-01T10:00:00Z", "value": 21.5 }]
            }]
        }]))
        .unwrap()
    }

    fn message(raw: serde_json::Value) -> String {
        raw.to_string()
    }

    fn ndata(value: f64) -> String {
        message(json!({
            "type": "NDATA",
            "timestamp": "2024-03-01T10:00:01Z",
            "data": {
                "node": { "id": "N1", "groupId": "G1", "online": true,
                          "lastMessageAt": "2024-03-01T10:00:01Z" },
                "nodeMetrics": [{ "name": "temp", "alias": 7, "dataType": "Double",
                                  "timestamp": "2024-03-01T10:00:01Z", "value": value }]
            }
        }))
    }

    fn session(messages: Vec<String>) -> LiveSession {
        LiveSession::new(
            RecordedTransport::new(snapshot(), messages).into_shared(),
            SessionConfig::default(),
        )
    }

    fn leaf_value(view: &SessionView) -> serde_json::Value {
        view.tree[0].children[0].children[0]
            .metric
            .as_ref()
            .unwrap()
            .value
            .clone()
    }

    #[tokio::test]
    async fn test_run_applies_recorded_stream() {
        let mut session = session(vec![
            ndata(22.0),
            message(json!({ "type": "NCMD", "data": {} })),
            message(json!({
                "type": "NDEATH",
                "timestamp": "2024-03-01T10:00:02Z",
                "data": { "node": { "id": "N1", "groupId": "G1" } }
            })),
        ]);
        let handle = session.handle();

        session.run().await.unwrap();

        let view = handle.current();
        assert_eq!(leaf_value(&view), json!(22.0));
        assert_eq!(view.tree[0].children[0].online, Some(false));
        assert_eq!(view.stats.metrics_stale, 1);
        // INITIAL, NDATA, NDEATH; the unknown tag never reaches the log
        assert_eq!(view.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_subscribe_requires_bootstrap() {
        let mut session = session(vec![]);
        assert!(matches!(
            session.subscribe().await,
            Err(MonitorError::NotBootstrapped)
        ));

        session.bootstrap().await.unwrap();
        assert!(session.subscribe().await.is_ok());
        assert!(matches!(
            session.subscribe().await,
            Err(MonitorError::AlreadyStreaming)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let mut session = session(vec![]);
        assert!(session.bootstrap().await.unwrap());
        assert!(!session.bootstrap().await.unwrap());

        assert_eq!(session.messages().len(), 1);
        assert!(session.store().node("G1/N1").is_some());
    }

    #[tokio::test]
    async fn test_failed_bootstrap_is_surfaced() {
        let transport = RecordedTransport::new(snapshot(), vec![])
            .failing_snapshot("connection refused")
            .into_shared();
        let mut session = LiveSession::new(transport, SessionConfig::default());

        assert!(matches!(
            session.run().await,
            Err(MonitorError::Transport(_))
        ));
        assert!(!session.is_bootstrapped());
        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn test_events_after_close_are_dropped() {
        let mut session = session(vec![]);
        session.bootstrap().await.unwrap();
        let before = session.store().clone();

        session.close();
        let record = EventRecord::parse(&ndata(30.0)).unwrap();
        assert_eq!(session.apply(&record), None);
        assert_eq!(session.store(), &before);
        assert!(matches!(session.bootstrap().await, Err(MonitorError::Closed)));
    }

    #[tokio::test]
    async fn test_ignored_event_keeps_tree() {
        let mut session = session(vec![]);
        session.bootstrap().await.unwrap();
        let tree = session.view().tree;

        let record = EventRecord::parse(&message(json!({
            "type": "DDATA",
            "timestamp": "2024-03-01T10:00:01Z",
            "data": {
                "node": { "id": "N1", "groupId": "G1" },
                "device": { "id": "D1", "nodeId": "N1", "groupId": "G1" },
                "deviceMetrics": []
            }
        })))
        .unwrap();

        assert_eq!(
            session.apply(&record),
            Some(Applied::Ignored(IgnoreReason::UnknownDevice("G1/N1/D1".into())))
        );
        let view = session.view();
        assert!(Arc::ptr_eq(&tree, &view.tree));
        assert_eq!(view.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_handle_close_stops_run() {
        let transport = RecordedTransport::new(snapshot(), vec![ndata(22.0)])
            .hold_open()
            .into_shared();
        let mut session = LiveSession::new(transport, SessionConfig::default());
        let handle = session.handle();
        let mut views = handle.views();

        let task = tokio::spawn(async move { session.run().await });

        // wait until the streamed value shows up
        loop {
            views.changed().await.unwrap();
            let view = views.borrow_and_update().clone();
            if !view.tree.is_empty() && leaf_value(&view) == json!(22.0) {
                break;
            }
        }

        handle.close();
        task.await.unwrap().unwrap();
        assert!(handle.is_closed());
        assert_eq!(leaf_value(&handle.current()), json!(22.0));
    }

    struct BrokenStream;

    #[async_trait]
    impl Transport for BrokenStream {
        async fn fetch_snapshot(&self) -> Result<Vec<FullGroup>> {
            Ok(snapshot())
        }

        async fn subscribe(&self) -> Result<RawMessageStream> {
            Ok(stream::iter(vec![
                Ok(ndata(23.0)),
                Err(MonitorError::Stream("connection reset".into())),
            ])
            .boxed())
        }
    }

    #[tokio::test]
    async fn test_stream_error_keeps_last_view() {
        let mut session = LiveSession::new(Arc::new(BrokenStream), SessionConfig::default());
        let handle = session.handle();

        assert!(matches!(session.run().await, Err(MonitorError::Stream(_))));
        assert_eq!(leaf_value(&handle.current()), json!(23.0));
    }
}

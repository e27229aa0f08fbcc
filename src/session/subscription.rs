//! Cancellable subscription over the live message stream.

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::transport::RawMessageStream;
use crate::error::Result;
use crate::events::EventRecord;

/// Lazy, non-restartable sequence of validated events.
///
/// Records that fail envelope validation are logged and skipped. Transport
/// errors are passed through to the caller. Once the token is cancelled the
/// subscription yields nothing more.
pub struct Subscription {
    inner: RawMessageStream,
    cancel: CancellationToken,
    received: u64,
    discarded: u64,
}

impl Subscription {
    pub fn new(inner: RawMessageStream, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancel,
            received: 0,
            discarded: 0,
        }
    }

    /// Next valid event, or `None` when the stream ended or was closed.
    pub async fn next_event(&mut self) -> Option<Result<EventRecord>> {
        loop {
            let raw = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                raw = self.inner.next() => raw?,
            };
            if self.cancel.is_cancelled() {
                return None;
            }

            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            self.received += 1;

            match EventRecord::parse(&raw) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    self.discarded += 1;
                    tracing::warn!("[session] discarding message: {}", e);
                }
            }
        }
    }

    /// Stop the subscription. Pending and future reads return `None`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Messages received so far, valid or not.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Messages dropped by envelope validation.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<EventRecord>> {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .next_event()
                .await
                .map(|item| (item, subscription))
        })
    }
}

//! Server-Sent-Events framing over an HTTP byte stream.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;

use crate::error::SseError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SseError>> + Send>>;

/// One dispatched SSE message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseMessage {
    /// Value of the `event:` field, if the server sent one
    pub event: Option<String>,
    /// Value of the `id:` field, if the server sent one
    pub id: Option<String>,
    /// Concatenated `data:` lines
    pub data: String,
}

/// A stream of SSE messages decoded from a chunked byte stream.
pub struct SseStream {
    /// The underlying byte stream
    inner: ByteStream,
    /// Bytes received but not yet terminated by a blank line
    buffer: Vec<u8>,
    /// Whether the byte stream has ended
    done: bool,
}

impl SseStream {
    /// Create a new SSE stream from a reqwest response.
    pub fn new(response: reqwest::Response) -> Self {
        tracing::debug!(
            "[sse] opening stream, content-type: {:?}",
            response.headers().get("content-type")
        );
        Self::from_byte_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| SseError::Stream(e.to_string()))),
        )
    }

    /// Create an SSE stream from any chunked byte source.
    pub fn from_byte_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, SseError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Append a chunk, dropping carriage returns so `\r\n` framing behaves like `\n`.
    fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Pop the next complete message block (without its terminating blank line).
    fn take_block(&mut self) -> Option<String> {
        let pos = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let rest = self.buffer.split_off(pos + 2);
        let mut block = std::mem::replace(&mut self.buffer, rest);
        block.truncate(pos);
        Some(String::from_utf8_lossy(&block).into_owned())
    }

    /// Parse one message block into a message.
    ///
    /// Returns `None` for blocks that carry no `data:` field (comments,
    /// keep-alives, bare `retry:` hints).
    pub fn parse_block(block: &str) -> Option<SseMessage> {
        let mut message = SseMessage::default();
        let mut data_lines: Vec<&str> = Vec::new();

        for line in block.split('\n') {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "data" => data_lines.push(value),
                "event" => message.event = Some(value.to_string()),
                "id" => message.id = Some(value.to_string()),
                "retry" => {}
                other => tracing::trace!("[sse] ignoring unknown field '{}'", other),
            }
        }

        if data_lines.is_empty() {
            return None;
        }
        message.data = data_lines.join("\n");
        Some(message)
    }
}

impl Stream for SseStream {
    type Item = Result<SseMessage, SseError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(block) = self.take_block() {
                if let Some(message) = Self::parse_block(&block) {
                    return Poll::Ready(Some(Ok(message)));
                }
                continue;
            }

            if self.done {
                // Flush an unterminated trailing message once
                if self.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let block = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
                match Self::parse_block(&block) {
                    Some(message) => return Poll::Ready(Some(Ok(message))),
                    None => return Poll::Ready(None),
                }
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    tracing::trace!("[sse] received {} bytes", bytes.len());
                    self.push_chunk(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::error!("[sse] stream error: {}", e);
                    self.done = true;
                    self.buffer.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    tracing::debug!(
                        "[sse] stream ended, {} bytes remaining in buffer",
                        self.buffer.len()
                    );
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn stream_of(chunks: Vec<&'static [u8]>) -> SseStream {
        SseStream::from_byte_stream(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[test]
    fn test_parse_block_data_only() {
        let message = SseStream::parse_block("data: {\"a\":1}").unwrap();
        assert_eq!(message.data, "{\"a\":1}");
        assert_eq!(message.event, None);
    }

    #[test]
    fn test_parse_block_only_matches_field_at_line_start() {
        let message = SseStream::parse_block("data: {\"text\":\"data: nested\"}").unwrap();
        assert_eq!(message.data, "{\"text\":\"data: nested\"}");
    }

    #[test]
    fn test_parse_block_joins_multiple_data_lines() {
        let message = SseStream::parse_block("event: update\nid: 7\ndata: a\ndata: b").unwrap();
        assert_eq!(message.data, "a\nb");
        assert_eq!(message.event.as_deref(), Some("update"));
        assert_eq!(message.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_parse_block_comment_is_skipped() {
        assert!(SseStream::parse_block(": keep-alive").is_none());
        assert!(SseStream::parse_block("retry: 1000").is_none());
    }

    #[tokio::test]
    async fn test_messages_split_across_chunks() {
        let mut sse = stream_of(vec![b"data: fir", b"st\n", b"\ndata: second\n\n"]);
        assert_eq!(sse.next().await.unwrap().unwrap().data, "first");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "second");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        let mut sse = stream_of(vec![b"data: one\r\n\r\ndata: two\r\n\r\n"]);
        assert_eq!(sse.next().await.unwrap().unwrap().data, "one");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "two");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_utf8_split_inside_codepoint() {
        // "°" is 0xC2 0xB0
        let mut sse = stream_of(vec![b"data: 21\xC2", b"\xB0C\n\n"]);
        assert_eq!(sse.next().await.unwrap().unwrap().data, "21°C");
    }

    #[tokio::test]
    async fn test_trailing_message_flushed_at_end() {
        let mut sse = stream_of(vec![b": hello\n\ndata: last"]);
        assert_eq!(sse.next().await.unwrap().unwrap().data, "last");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_error_ends_stream() {
        let chunks: Vec<Result<Bytes, SseError>> = vec![
            Ok(Bytes::from_static(b"data: ok\n\n")),
            Err(SseError::Stream("reset".into())),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let mut sse = SseStream::from_byte_stream(stream::iter(chunks));
        assert_eq!(sse.next().await.unwrap().unwrap().data, "ok");
        assert!(matches!(sse.next().await, Some(Err(SseError::Stream(_)))));
        assert!(sse.next().await.is_none());
    }
}

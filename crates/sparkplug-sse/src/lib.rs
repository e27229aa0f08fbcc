//! Minimal HTTP + Server-Sent-Events client.
//!
//! This crate provides the two requests a live dashboard needs against its
//! backend: a one-shot JSON fetch and a long-lived `text/event-stream`
//! subscription decoded into [`SseMessage`]s. It knows nothing about the
//! payloads it carries.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use sparkplug_sse::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:8080")?;
//!     let mut stream = client.open_stream("/api/groups/stream").await?;
//!
//!     while let Some(message) = stream.next().await {
//!         println!("{}", message?.data);
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod streaming;

pub use client::Client;
pub use error::SseError;
pub use streaming::{SseMessage, SseStream};

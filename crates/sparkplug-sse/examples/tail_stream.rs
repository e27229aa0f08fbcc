//! Print every SSE payload from an endpoint.
//!
//! Run with: `cargo run -p sparkplug-sse --example tail_stream -- http://localhost:8080 /api/groups/stream`

use futures::StreamExt;
use sparkplug_sse::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let base_url = args
        .next()
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let path = args
        .next()
        .unwrap_or_else(|| "/api/groups/stream".to_string());

    let client = Client::new(&base_url)?;
    let mut stream = client.open_stream(&path).await?;

    while let Some(message) = stream.next().await {
        let message = message?;
        match message.event {
            Some(event) => println!("[{}] {}", event, message.data),
            None => println!("{}", message.data),
        }
    }

    Ok(())
}

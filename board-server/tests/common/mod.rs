//! Shared helpers for integration tests.

#![allow(dead_code)]

mod server;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

pub use server::TestServer;

/// Receive and parse one JSON text frame, with a timeout.
pub async fn recv_json(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Option<Value> {
    let msg = timeout(Duration::from_secs(5), stream.next())
        .await
        .ok()??
        .ok()?;

    match msg {
        Message::Text(text) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

/// Assert that nothing arrives within `wait`.
pub async fn assert_silent(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    wait: Duration,
) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(wait, stream.next()).await {
        panic!("Expected no message, got {text}");
    }
}

/// Send a JSON value as a text frame.
pub async fn send_json<S>(sink: &mut S, value: &Value) -> Result<(), String>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text))
        .await
        .map_err(|_| "send failed".to_string())
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// WebSocket-backed implementation of the core's client transport seam.

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use ripple_core::{ClientTransport, Error, Message, Result};
use tokio::sync::Mutex;

/// One JSON text frame per message; pings and the closing handshake share
/// the same sink. The mutex serializes the writer half between the
/// delivery actor and close().
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl ClientTransport for WsTransport {
    async fn send(&self, message: &Message) -> Result<()> {
        let payload =
            serde_json::to_string(message).map_err(|err| Error::Transport(err.to_string()))?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(payload))
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    async fn ping(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Ping(Vec::new()))
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink
            .send(WsMessage::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "subscriber disconnected".into(),
            })))
            .await;
    }
}

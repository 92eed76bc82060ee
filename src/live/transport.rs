// ABOUTME: WebSocket implementation of StreamConnector
// ABOUTME: Yields text frames only; pings, pongs and binary frames are dropped

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::watchdog::{FrameStream, StreamConnector};

/// Default BeatSaver map event stream
pub const DEFAULT_MAP_STREAM_URL: &str = "wss://ws.beatsaver.com/maps";

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self) -> Result<FrameStream> {
        let (socket, response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        tracing::debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Received close frame");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(anyhow::Error::new(e).context("WebSocket read failed"))),
            }
        });
        Ok(frames.boxed())
    }
}

// ABOUTME: Per-connection reconnect loop with a handshake deadline
// ABOUTME: Reads frames from one stream and forwards parsed events to the dispatcher queue

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::events::{parse_frame, StreamEvent};

/// Text frames of one open connection. The stream ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Opens event-stream connections.
///
/// `connect` resolves once the connection is open. Dropping the returned
/// future abandons the attempt.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> Result<FrameStream>;
}

/// The two independent upstream event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Maps,
    Votes,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Maps => f.write_str("maps"),
            Channel::Votes => f.write_str("votes"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub channel: Channel,
    pub event: StreamEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How long an attempt may take to open before it is abandoned
    pub handshake_timeout: Duration,
    /// Wait after a close or error before the next attempt
    pub reconnect_delay: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(15),
        }
    }
}

enum Disconnect {
    Closed,
    Error(anyhow::Error),
    QueueClosed,
}

/// Keeps one event stream connected for as long as the dispatcher runs.
///
/// Retries forever. A stalled handshake is dropped after
/// `handshake_timeout` and a new attempt starts immediately; a close or error
/// waits `reconnect_delay` first.
pub struct ConnectionWatchdog {
    channel: Channel,
    connector: Arc<dyn StreamConnector>,
    config: WatchdogConfig,
    state: ConnectionState,
    attempts: u64,
}

impl ConnectionWatchdog {
    pub fn new(
        channel: Channel,
        connector: Arc<dyn StreamConnector>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            channel,
            connector,
            config,
            state: ConnectionState::Closed,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs until `events` is closed.
    pub async fn run(mut self, events: mpsc::Sender<ChannelEvent>) {
        while !events.is_closed() {
            self.attempts += 1;
            self.set_state(ConnectionState::Connecting);
            tracing::info!(
                channel = %self.channel,
                attempt = self.attempts,
                "Establishing socket connection"
            );

            let attempt =
                tokio::time::timeout(self.config.handshake_timeout, self.connector.connect()).await;
            let stream = match attempt {
                Err(_) => {
                    tracing::warn!(
                        channel = %self.channel,
                        "Socket connection hit a timeout after {:?}, trying again",
                        self.config.handshake_timeout
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    self.set_state(ConnectionState::Closed);
                    tracing::warn!(
                        channel = %self.channel,
                        "Socket connection failed ({:#}), reconnecting in {:?}",
                        e,
                        self.config.reconnect_delay
                    );
                    tokio::time::sleep(self.config.reconnect_delay).await;
                    continue;
                }
                Ok(Ok(stream)) => stream,
            };

            self.set_state(ConnectionState::Open);
            tracing::info!(channel = %self.channel, "Socket connection established");

            match self.pump(stream, &events).await {
                Disconnect::QueueClosed => break,
                Disconnect::Closed => {
                    tracing::warn!(
                        channel = %self.channel,
                        "Socket connection closed, reconnecting in {:?}",
                        self.config.reconnect_delay
                    );
                }
                Disconnect::Error(e) => {
                    tracing::warn!(
                        channel = %self.channel,
                        "Socket connection errored ({:#}), reconnecting in {:?}",
                        e,
                        self.config.reconnect_delay
                    );
                }
            }
            self.set_state(ConnectionState::Closed);
            tokio::time::sleep(self.config.reconnect_delay).await;
        }

        self.set_state(ConnectionState::Closed);
        tracing::debug!(channel = %self.channel, "Event queue closed, watchdog exiting");
    }

    async fn pump(&self, mut stream: FrameStream, events: &mpsc::Sender<ChannelEvent>) -> Disconnect {
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(text) => text,
                Err(e) => return Disconnect::Error(e),
            };
            let event = match parse_frame(&text) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(channel = %self.channel, "Ignoring malformed frame: {:#}", e);
                    continue;
                }
            };
            let message = ChannelEvent {
                channel: self.channel,
                event,
            };
            if events.send(message).await.is_err() {
                return Disconnect::QueueClosed;
            }
        }
        Disconnect::Closed
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(channel = %self.channel, from = ?self.state, to = ?state, "Connection state change");
            self.state = state;
        }
    }
}

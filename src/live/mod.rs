// ABOUTME: Live sync engine: per-channel watchdog tasks feeding one dispatcher
// ABOUTME: Runs until a shutdown signal arrives, then hands the store back

pub mod dispatcher;
pub mod events;
pub mod transport;
pub mod watchdog;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::catalog::Catalog;
use crate::snapshot::SnapshotWriter;
use crate::store::MirrorStore;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use events::{parse_frame, StreamEvent, VoteSummary};
pub use transport::{WebSocketConnector, DEFAULT_MAP_STREAM_URL};
pub use watchdog::{
    Channel, ChannelEvent, ConnectionState, ConnectionWatchdog, FrameStream, StreamConnector,
    WatchdogConfig,
};

/// Capacity of the queue between connection readers and the dispatcher.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Keeps the mirror current from the upstream event streams.
pub struct LiveSync {
    store: MirrorStore,
    catalog: Arc<dyn Catalog>,
    snapshot: SnapshotWriter,
    config: WatchdogConfig,
    connectors: Vec<(Channel, Arc<dyn StreamConnector>)>,
}

impl LiveSync {
    pub fn new(
        store: MirrorStore,
        catalog: Arc<dyn Catalog>,
        snapshot: SnapshotWriter,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            snapshot,
            config,
            connectors: Vec::new(),
        }
    }

    /// Adds an event stream. Each one gets its own watchdog task.
    pub fn with_connector(mut self, channel: Channel, connector: Arc<dyn StreamConnector>) -> Self {
        self.connectors.push((channel, connector));
        self
    }

    /// Runs until `shutdown` fires and returns the final store.
    ///
    /// Events already queued when the signal arrives are still applied.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<MirrorStore> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        tracing::info!(
            "Starting live sync with {} channel(s), {} maps mirrored",
            self.connectors.len(),
            self.store.len()
        );

        let watchdogs: Vec<_> = self
            .connectors
            .into_iter()
            .map(|(channel, connector)| {
                let watchdog = ConnectionWatchdog::new(channel, connector, self.config.clone());
                tokio::spawn(watchdog.run(tx.clone()))
            })
            .collect();
        drop(tx);

        let dispatcher = Dispatcher::new(self.store, self.catalog, self.snapshot);
        let mut dispatcher = tokio::spawn(dispatcher.run(rx));

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, stopping live sync");
                // dropping the watchdogs drops every sender, which ends the dispatcher
                for handle in &watchdogs {
                    handle.abort();
                }
                dispatcher.await.context("Dispatcher task failed")
            }
            result = &mut dispatcher => {
                tracing::warn!("Dispatcher stopped before shutdown");
                for handle in &watchdogs {
                    handle.abort();
                }
                result.context("Dispatcher task failed")
            }
        }
    }
}

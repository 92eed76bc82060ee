// ABOUTME: Single consumer of live stream events; sole writer of the mirror store
// ABOUTME: Applies updates, deletes and votes in queue order and flushes snapshots

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::{StreamEvent, VoteSummary};
use super::watchdog::ChannelEvent;
use crate::catalog::Catalog;
use crate::model::Votes;
use crate::snapshot::SnapshotWriter;
use crate::store::{Ingested, MirrorStore};

/// Counters for events handled since the dispatcher started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub updates: u64,
    pub deletes: u64,
    pub votes: u64,
    /// On-demand fetches triggered by votes for unknown maps
    pub fetches: u64,
    pub unhandled: u64,
    /// Votes dropped because their map is known to be filtered out
    pub skipped_votes: u64,
}

/// How many filtered-out ids are remembered to skip vote refetches.
const REJECTED_CAPACITY: usize = 4096;

/// Bounded set of ids upstream serves but the filters reject; oldest evicted first.
#[derive(Debug, Default)]
struct RejectedIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl RejectedIds {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > REJECTED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|known| known != id);
        }
    }
}

pub struct Dispatcher {
    store: MirrorStore,
    catalog: Arc<dyn Catalog>,
    snapshot: SnapshotWriter,
    stats: DispatchStats,
    rejected: RejectedIds,
}

impl Dispatcher {
    pub fn new(store: MirrorStore, catalog: Arc<dyn Catalog>, snapshot: SnapshotWriter) -> Self {
        Self {
            store,
            catalog,
            snapshot,
            stats: DispatchStats::default(),
            rejected: RejectedIds::default(),
        }
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Applies queued events in arrival order until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<ChannelEvent>) -> MirrorStore {
        while let Some(ChannelEvent { channel, event }) = events.recv().await {
            tracing::trace!(%channel, "Dispatching event");
            self.handle(event).await;
        }
        tracing::info!(
            "Dispatcher stopped: {} updates, {} deletes, {} votes, {} fetches",
            self.stats.updates,
            self.stats.deletes,
            self.stats.votes,
            self.stats.fetches
        );
        self.store
    }

    pub async fn handle(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::MapUpdate(raw) => {
                self.stats.updates += 1;
                let id = raw.get("id").and_then(|id| id.as_str()).unwrap_or("?");
                tracing::info!("Updating key {}", id);
                match self.store.ingest(&raw) {
                    Ok(Ingested::Accepted) => self.rejected.remove(id),
                    Ok(Ingested::Rejected { reason, removed }) => {
                        tracing::info!(removed, "Map {} filtered out: {}", id, reason);
                        self.rejected.insert(id);
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable map update: {}", e);
                        return;
                    }
                }
                self.snapshot.flush_logged(&self.store).await;
            }
            StreamEvent::MapDelete(id) => {
                self.stats.deletes += 1;
                tracing::info!("Deleting key {}", id);
                self.store.delete(&id);
                self.rejected.remove(&id);
                self.snapshot.flush_logged(&self.store).await;
            }
            StreamEvent::Vote(vote) => {
                self.stats.votes += 1;
                self.apply_vote(vote).await;
            }
            StreamEvent::Unhandled(kind) => {
                self.stats.unhandled += 1;
                tracing::warn!("Unhandled event type: {}", kind);
            }
        }
    }

    /// Updates the vote pair in place, or materializes an unknown map first.
    ///
    /// For unknown maps the fetched record's own stats win over the vote.
    /// Maps already seen to be filtered out are not fetched again.
    async fn apply_vote(&mut self, vote: VoteSummary) {
        let votes = Votes {
            up: vote.upvotes,
            down: vote.downvotes,
        };
        if self.store.apply_votes(&vote.map_id, votes) {
            tracing::debug!(
                map_id = %vote.map_id,
                up = votes.up,
                down = votes.down,
                "Updated votes"
            );
            self.snapshot.flush_logged(&self.store).await;
            return;
        }

        if self.rejected.contains(&vote.map_id) {
            self.stats.skipped_votes += 1;
            tracing::debug!(map_id = %vote.map_id, "Dropping vote for filtered map");
            return;
        }

        self.stats.fetches += 1;
        tracing::info!("Vote for unknown key {}, fetching map", vote.map_id);
        let raw = match self.catalog.map_by_id(&vote.map_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::warn!("Map {} not found upstream, dropping vote", vote.map_id);
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch map {} ({:#}), dropping vote", vote.map_id, e);
                return;
            }
        };

        match self.store.ingest(&raw) {
            Ok(Ingested::Accepted) => {
                self.snapshot.flush_logged(&self.store).await;
            }
            Ok(Ingested::Rejected { reason, .. }) => {
                tracing::info!("Fetched map {} filtered out: {}", vote.map_id, reason);
                self.rejected.insert(&vote.map_id);
            }
            Err(e) => {
                tracing::warn!("Fetched map {} is unreadable: {}", vote.map_id, e);
            }
        }
    }
}

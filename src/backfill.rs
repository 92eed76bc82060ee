// ABOUTME: Paginated full-catalog walk that seeds the mirror store
// ABOUTME: Follows a descending upload-time cursor until an empty page is returned

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::snapshot::SnapshotWriter;
use crate::store::{Ingested, MirrorStore};

/// Configuration for a backfill run.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Records requested per page
    pub page_size: u32,
    /// Wait before re-requesting a page that failed
    pub retry_delay: Duration,
    /// Pause between successful pages
    pub page_delay: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            retry_delay: Duration::from_secs(3),
            page_delay: Duration::from_millis(100),
        }
    }
}

/// Statistics from a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    /// Successful page responses, including the final empty one
    pub pages: u64,
    /// Records seen across all pages
    pub records: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Records that could not be normalized at all
    pub invalid: u64,
    /// Failed page requests that were retried
    pub retries: u64,
    pub duration_ms: u64,
}

/// Walks the whole upstream catalog once.
pub struct Backfill<'a> {
    catalog: &'a dyn Catalog,
    config: BackfillConfig,
}

impl<'a> Backfill<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: BackfillConfig) -> Self {
        Self { catalog, config }
    }

    /// Scans from the current wall-clock time back to the oldest map.
    pub async fn run(&self, store: &mut MirrorStore) -> BackfillStats {
        let cursor = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.run_from(store, cursor).await
    }

    /// Scans backwards starting at `cursor` (an ISO-8601 timestamp).
    ///
    /// Only an empty page ends the scan; short pages do not. Failed page
    /// requests are retried forever with the cursor unchanged.
    pub async fn run_from(&self, store: &mut MirrorStore, mut cursor: String) -> BackfillStats {
        let start = std::time::Instant::now();
        let mut stats = BackfillStats::default();

        tracing::info!(
            "Starting backfill from {} (page size: {})",
            cursor,
            self.config.page_size
        );

        loop {
            let docs = match self
                .catalog
                .latest_page(&cursor, self.config.page_size)
                .await
            {
                Ok(docs) => docs,
                Err(e) => {
                    stats.retries += 1;
                    tracing::warn!(
                        "Catalog page request failed ({:#}), retrying in {:?}",
                        e,
                        self.config.retry_delay
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    continue;
                }
            };
            stats.pages += 1;

            if docs.is_empty() {
                tracing::info!("No maps left before {}", cursor);
                break;
            }

            for raw in &docs {
                stats.records += 1;
                match store.ingest(raw) {
                    Ok(Ingested::Accepted) => stats.accepted += 1,
                    Ok(Ingested::Rejected { reason, .. }) => {
                        stats.rejected += 1;
                        tracing::debug!(map_id = ?raw.get("id"), %reason, "Skipping map");
                    }
                    Err(e) => {
                        stats.invalid += 1;
                        tracing::warn!("Skipping unreadable map: {}", e);
                    }
                }
            }

            match next_cursor(&docs) {
                Some(next) => cursor = next.to_string(),
                None => {
                    tracing::error!(
                        "Page before {} has no upload timestamps, cannot advance; stopping backfill",
                        cursor
                    );
                    break;
                }
            }

            tracing::info!(
                "Cached {} maps (currently at: {}) ...",
                stats.records,
                docs.last()
                    .and_then(|d| d.get("id"))
                    .and_then(|id| id.as_str())
                    .unwrap_or("?")
            );

            tokio::time::sleep(self.config.page_delay).await;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Backfill completed: {} records ({} accepted, {} rejected, {} invalid) over {} pages in {}ms",
            stats.records,
            stats.accepted,
            stats.rejected,
            stats.invalid,
            stats.pages,
            stats.duration_ms
        );
        stats
    }
}

/// Backfills a fresh store and writes the first snapshot.
///
/// A failed write is logged and the store is still returned; the next
/// mutation rewrites the whole snapshot.
pub async fn seed(
    catalog: &dyn Catalog,
    config: BackfillConfig,
    snapshot: &SnapshotWriter,
) -> (MirrorStore, BackfillStats) {
    let mut store = MirrorStore::new();
    let stats = Backfill::new(catalog, config).run(&mut store).await;
    snapshot.flush_logged(&store).await;
    (store, stats)
}

/// Upload timestamp of the last record in the page that has one.
fn next_cursor(docs: &[Value]) -> Option<&str> {
    docs.iter()
        .rev()
        .find_map(|doc| doc.get("uploaded").and_then(Value::as_str))
}

// ABOUTME: Upstream catalog access used by backfill and on-demand fetches
// ABOUTME: The Catalog trait lets the sync engine run against fakes in tests

pub mod client;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use client::CatalogClient;
pub use models::PageResponse;

/// Read access to the upstream map catalog.
///
/// Records are returned as raw JSON so each one can be validated on its own.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// One page of maps uploaded strictly before `before`, newest first.
    async fn latest_page(&self, before: &str, page_size: u32) -> Result<Vec<Value>>;

    /// A single map by id, or `None` if upstream does not know it.
    async fn map_by_id(&self, id: &str) -> Result<Option<Value>>;
}

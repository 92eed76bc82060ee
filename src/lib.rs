// ABOUTME: Library entry point for beatsaver-cache
// ABOUTME: Exposes the normalizer, mirror store, snapshot writer, backfill and live sync engine

pub mod backfill;
pub mod catalog;
pub mod config;
pub mod live;
pub mod model;
pub mod normalize;
pub mod snapshot;
pub mod store;

pub use backfill::{Backfill, BackfillConfig, BackfillStats};
pub use catalog::{Catalog, CatalogClient};
pub use config::Settings;
pub use live::LiveSync;
pub use store::MirrorStore;

// ABOUTME: In-memory mirror of the upstream catalog keyed by map id
// ABOUTME: Owned by a single writer: the backfill first, then the live dispatcher

use std::collections::HashMap;

use serde_json::Value;

use crate::model::{CanonicalRecord, Votes};
use crate::normalize::{normalize, NormalizeError, Normalized, Rejection};

/// What applying one normalized record did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Upserted,
    Removed,
    Unchanged,
}

/// Outcome of feeding one raw upstream record through the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Accepted,
    Rejected { reason: Rejection, removed: bool },
}

#[derive(Debug, Default, Clone)]
pub struct MirrorStore {
    records: HashMap<String, CanonicalRecord>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CanonicalRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CanonicalRecord)> {
        self.records.iter()
    }

    /// Replaces the stored record for `record.id` wholesale.
    pub fn upsert(&mut self, record: CanonicalRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Removes `id`, returning whether it was present.
    pub fn delete(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    /// Replaces only the vote pair of a known record.
    ///
    /// Returns `false` when `id` is not mirrored, so the caller can fetch it.
    pub fn apply_votes(&mut self, id: &str, votes: Votes) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.votes = votes;
                true
            }
            None => false,
        }
    }

    pub fn apply(&mut self, normalized: Normalized) -> StoreChange {
        match normalized {
            Normalized::Accepted(record) => {
                self.upsert(record);
                StoreChange::Upserted
            }
            Normalized::Rejected { id, .. } => {
                if self.delete(&id) {
                    StoreChange::Removed
                } else {
                    StoreChange::Unchanged
                }
            }
        }
    }

    /// Normalizes `raw` and upserts or deletes accordingly.
    ///
    /// Unreadable records leave the store untouched.
    pub fn ingest(&mut self, raw: &Value) -> Result<Ingested, NormalizeError> {
        let normalized = normalize(raw)?;
        let reason = match &normalized {
            Normalized::Accepted(_) => None,
            Normalized::Rejected { reason, .. } => Some(*reason),
        };
        let change = self.apply(normalized);
        Ok(match reason {
            None => Ingested::Accepted,
            Some(reason) => Ingested::Rejected {
                reason,
                removed: change == StoreChange::Removed,
            },
        })
    }
}

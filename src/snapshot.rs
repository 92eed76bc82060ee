// ABOUTME: Persists the mirror store as a gzipped protobuf snapshot
// ABOUTME: Writes go to a temp file in the target directory and are renamed into place

use anyhow::{Context, Result};
use cache_format::map_data::{
    Difficulty, MapList, MapMetadata, RankedStatus as ProtoRankedStatus,
    RankedValues as ProtoRankedValues, Votes as ProtoVotes,
};
use cache_format::{decode_snapshot, encode_snapshot, SCHEMA_VERSION};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::{CanonicalRecord, DifficultyRecord, RankedStatus};
use crate::store::MirrorStore;

/// Mode of the persisted snapshot on unix: owner read/write, world readable.
#[cfg(unix)]
const SNAPSHOT_MODE: u32 = 0o644;

impl From<&RankedStatus> for ProtoRankedStatus {
    fn from(status: &RankedStatus) -> Self {
        Self {
            is_ranked: status.is_ranked,
            stars: status.stars,
        }
    }
}

impl From<&DifficultyRecord> for Difficulty {
    fn from(diff: &DifficultyRecord) -> Self {
        Self {
            njs: diff.njs,
            notes: diff.notes,
            characteristic_name: diff.characteristic.clone(),
            difficulty_name: diff.difficulty.clone(),
            mods: diff.mods.bits(),
            environment_name: diff.environment.clone(),
            ranked: Some(ProtoRankedValues {
                score_saber: Some((&diff.ranked.score_saber).into()),
                beat_leader: Some((&diff.ranked.beat_leader).into()),
            }),
        }
    }
}

impl From<&CanonicalRecord> for MapMetadata {
    fn from(record: &CanonicalRecord) -> Self {
        Self {
            key: record.key,
            hash: record.hash.clone(),
            duration: record.duration,
            uploaded: record.uploaded.max(0) as u64,
            last_updated: record.last_updated.max(0) as u64,
            mods: record.mods.bits(),
            votes: Some(ProtoVotes {
                up: record.votes.up,
                down: record.votes.down,
            }),
            difficulties: record.difficulties.iter().map(Difficulty::from).collect(),
            curator_name: record.curator_name.clone(),
            song_name: record.song_name.clone(),
            song_sub_name: record.song_sub_name.clone(),
            song_author_name: record.song_author_name.clone(),
            level_author_name: record.level_author_name.clone(),
        }
    }
}

/// Builds the persisted message for the current store contents.
pub fn to_map_list(store: &MirrorStore) -> MapList {
    MapList {
        map_metadata: store
            .iter()
            .map(|(id, record)| (id.clone(), MapMetadata::from(record)))
            .collect(),
        schema_version: SCHEMA_VERSION,
    }
}

/// Writes full-store snapshots to a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes the store and atomically replaces the snapshot file.
    ///
    /// Returns the number of compressed bytes written.
    pub async fn flush(&self, store: &MirrorStore) -> Result<usize> {
        let bytes = encode_snapshot(&to_map_list(store)).context("Failed to encode snapshot")?;
        let len = bytes.len();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .context("Snapshot write task panicked")??;
        Ok(len)
    }

    /// Flushes and logs failures instead of returning them.
    ///
    /// A failed flush is retried implicitly by the next mutation.
    pub async fn flush_logged(&self, store: &MirrorStore) {
        match self.flush(store).await {
            Ok(bytes) => {
                tracing::debug!(
                    records = store.len(),
                    bytes,
                    path = %self.path.display(),
                    "Snapshot written"
                );
            }
            Err(e) => {
                tracing::error!("Failed to write snapshot to {:?}: {:?}", self.path, e);
            }
        }
    }
}

/// Reads and decodes a snapshot file.
pub async fn load(path: &Path) -> Result<MapList> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read snapshot from {:?}", path))?;
    decode_snapshot(&bytes).with_context(|| format!("Failed to decode snapshot {:?}", path))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {:?}", dir))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    temp.write_all(data)
        .context("Failed to write snapshot temp file")?;
    set_snapshot_permissions(temp.as_file())?;
    temp.as_file()
        .sync_all()
        .context("Failed to sync snapshot temp file")?;
    temp.persist(path)
        .with_context(|| format!("Failed to persist snapshot to {:?}", path))?;
    Ok(())
}

/// Temp files start owner-only; the renamed snapshot must be world readable.
fn set_snapshot_permissions(file: &std::fs::File) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(SNAPSHOT_MODE))
            .context("Failed to set snapshot permissions")?;
    }
    #[cfg(not(unix))]
    let _ = file;
    Ok(())
}

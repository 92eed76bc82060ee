use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use thiserror::Error;

use crate::map_data::MapList;

/// Version stamped into every `MapList` this crate writes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to compress snapshot: {0}")]
    Compress(#[source] std::io::Error),
    #[error("failed to decompress snapshot: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("failed to decode snapshot message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("unsupported snapshot schema version {found} (newest known is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Serializes the list and gzips the whole buffer.
///
/// Map entries are generated as `BTreeMap`, and the gzip header carries no
/// timestamp, so equal lists always produce equal bytes.
pub fn encode_snapshot(list: &MapList) -> Result<Vec<u8>, SnapshotError> {
    let raw = list.encode_to_vec();
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(&raw).map_err(SnapshotError::Compress)?;
    encoder.finish().map_err(SnapshotError::Compress)
}

/// Inverse of [`encode_snapshot`], used by readers of the cache file.
pub fn decode_snapshot(bytes: &[u8]) -> Result<MapList, SnapshotError> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut raw)
        .map_err(SnapshotError::Decompress)?;
    let list = MapList::decode(raw.as_slice())?;
    if list.schema_version > SCHEMA_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: list.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(list)
}

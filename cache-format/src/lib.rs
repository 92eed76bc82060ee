pub mod codec;

pub mod map_data {
    include!(concat!(env!("OUT_DIR"), "/cached_beat_saver_data.rs"));
}

pub use codec::{decode_snapshot, encode_snapshot, SnapshotError, SCHEMA_VERSION};

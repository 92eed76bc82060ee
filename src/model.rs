// ABOUTME: Canonical map records held by the mirror store
// ABOUTME: Also defines the mod bit flags shared by maps and difficulties

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Bitmask of the gameplay mods a map or difficulty requires.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mods: u32 {
        const CINEMA = 1 << 0;
        const MAPPING_EXTENSIONS = 1 << 1;
        const CHROMA = 1 << 2;
        const NOODLE_EXTENSIONS = 1 << 3;
        const VIVIFY = 1 << 4;
    }
}

impl Mods {
    /// Upstream boolean field name for each flag.
    pub const FIELDS: [(&'static str, Mods); 5] = [
        ("cinema", Mods::CINEMA),
        ("me", Mods::MAPPING_EXTENSIONS),
        ("chroma", Mods::CHROMA),
        ("ne", Mods::NOODLE_EXTENSIONS),
        ("vivify", Mods::VIVIFY),
    ];
}

impl Default for Mods {
    fn default() -> Self {
        Mods::empty()
    }
}

impl fmt::Display for Mods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Mods::FIELDS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Votes {
    pub up: u32,
    pub down: u32,
}

/// Ranking state reported by one external leaderboard.
///
/// `is_ranked` only records that the upstream field was present. A present
/// but non-numeric value still reports ranked with zero stars.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankedStatus {
    pub is_ranked: bool,
    pub stars: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankedValues {
    pub score_saber: RankedStatus,
    pub beat_leader: RankedStatus,
}

/// One playable difficulty of a map, in upstream order.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyRecord {
    pub njs: f32,
    pub notes: u32,
    pub characteristic: String,
    pub difficulty: String,
    pub mods: Mods,
    pub environment: String,
    pub ranked: RankedValues,
}

/// Normalized form of one upstream map.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Upstream identifier, a lowercase hex string such as `"3a5f"`.
    pub id: String,
    /// `id` parsed as base-16, used as the persisted key.
    pub key: u32,
    pub hash: String,
    /// Song length in seconds.
    pub duration: u32,
    /// Epoch seconds of the last publish.
    pub uploaded: i64,
    /// Epoch seconds of the last upstream modification.
    pub last_updated: i64,
    pub mods: Mods,
    pub votes: Votes,
    pub difficulties: Vec<DifficultyRecord>,
    pub curator_name: Option<String>,
    pub song_name: Option<String>,
    pub song_sub_name: Option<String>,
    pub song_author_name: Option<String>,
    pub level_author_name: Option<String>,
}

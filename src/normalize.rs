// ABOUTME: Converts raw BeatSaver map JSON into canonical records
// ABOUTME: Applies the publish/AI/automapper filters and derives mod bitmasks

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{
    CanonicalRecord, DifficultyRecord, Mods, RankedStatus, RankedValues, Votes,
};

const ENVIRONMENT_SUFFIX: &str = "Environment";
const PUBLISHED_STATE: &str = "Published";

/// Why a well-formed upstream map must not be mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("map has never been published")]
    NeverPublished,
    #[error("latest version is not published")]
    NotPublished,
    #[error("map is declared as AI generated")]
    AiGenerated,
    #[error("map was made by an automapper")]
    Automapper,
}

/// The upstream record could not be read at all.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record has no string `id`")]
    MissingId,
    #[error("map {id}: identifier is not a hexadecimal key")]
    InvalidKey { id: String },
    #[error("map {id}: {source}")]
    Schema {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("map {id}: record has no versions")]
    NoVersion { id: String },
    #[error("map {id}: invalid timestamp {value:?}")]
    Timestamp {
        id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Result of normalizing a record that could be read.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Accepted(CanonicalRecord),
    Rejected { id: String, reason: Rejection },
}

impl Normalized {
    pub fn id(&self) -> &str {
        match self {
            Normalized::Accepted(record) => &record.id,
            Normalized::Rejected { id, .. } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMap {
    metadata: RawMetadata,
    stats: RawStats,
    uploaded: Option<String>,
    updated_at: String,
    last_published_at: Option<String>,
    curator: Option<RawUser>,
    versions: Vec<RawVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    duration: u32,
    #[serde(default)]
    song_name: String,
    #[serde(default)]
    song_sub_name: String,
    #[serde(default)]
    song_author_name: String,
    #[serde(default)]
    level_author_name: String,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    upvotes: u32,
    downvotes: u32,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    hash: String,
    #[serde(default)]
    diffs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDifficulty {
    njs: f32,
    notes: u32,
    characteristic: String,
    difficulty: String,
    environment: String,
}

/// Normalizes one upstream map.
///
/// Filter rejections are returned as `Ok(Normalized::Rejected)` so callers can
/// treat them as deletion signals. Only unreadable records produce an error.
pub fn normalize(raw: &Value) -> Result<Normalized, NormalizeError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingId)?
        .to_string();

    if let Some(reason) = check_filters(raw) {
        return Ok(Normalized::Rejected { id, reason });
    }

    let key = parse_key(&id).ok_or_else(|| NormalizeError::InvalidKey { id: id.clone() })?;
    let map = RawMap::deserialize(raw).map_err(|source| NormalizeError::Schema {
        id: id.clone(),
        source,
    })?;
    let version = map
        .versions
        .first()
        .ok_or_else(|| NormalizeError::NoVersion { id: id.clone() })?;

    let published_at = map
        .last_published_at
        .as_deref()
        .or(map.uploaded.as_deref())
        .unwrap_or_default();
    let uploaded = epoch_seconds(&id, published_at)?;
    let last_updated = epoch_seconds(&id, &map.updated_at)?;

    let mut mods = Mods::empty();
    let mut difficulties = Vec::with_capacity(version.diffs.len());
    for raw_diff in &version.diffs {
        mods |= mods_of(raw_diff);
        match normalize_difficulty(raw_diff) {
            Ok(diff) => difficulties.push(diff),
            Err(e) => {
                tracing::warn!(map_id = %id, error = %e, "Dropping invalid difficulty");
            }
        }
    }

    Ok(Normalized::Accepted(CanonicalRecord {
        key,
        hash: version.hash.clone(),
        duration: map.metadata.duration,
        uploaded,
        last_updated,
        mods,
        votes: Votes {
            up: map.stats.upvotes,
            down: map.stats.downvotes,
        },
        difficulties,
        curator_name: map.curator.map(|c| c.name).and_then(non_empty),
        song_name: non_empty(map.metadata.song_name),
        song_sub_name: non_empty(map.metadata.song_sub_name),
        song_author_name: non_empty(map.metadata.song_author_name),
        level_author_name: non_empty(map.metadata.level_author_name),
        id,
    }))
}

/// Returns the first failing validity filter, in filter order.
pub fn check_filters(raw: &Value) -> Option<Rejection> {
    if raw.get("uploaded").map_or(true, Value::is_null) {
        return Some(Rejection::NeverPublished);
    }
    if raw.pointer("/versions/0/state").and_then(Value::as_str) != Some(PUBLISHED_STATE) {
        return Some(Rejection::NotPublished);
    }
    let declared_ai = match raw.get("declaredAi") {
        Some(Value::String(kind)) => kind != "None",
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    };
    if declared_ai {
        return Some(Rejection::AiGenerated);
    }
    if raw.get("automapper").and_then(Value::as_bool) == Some(true) {
        return Some(Rejection::Automapper);
    }
    None
}

/// Parses an upstream identifier as its fixed-width key.
pub fn parse_key(id: &str) -> Option<u32> {
    u32::from_str_radix(id, 16).ok()
}

/// Mods whose boolean field is `true` on the given JSON object.
pub fn mods_of(object: &Value) -> Mods {
    Mods::FIELDS
        .iter()
        .filter(|(field, _)| object.get(*field).and_then(Value::as_bool) == Some(true))
        .fold(Mods::empty(), |acc, (_, flag)| acc | *flag)
}

pub fn strip_environment(environment: &str) -> String {
    environment.replace(ENVIRONMENT_SUFFIX, "")
}

fn normalize_difficulty(raw: &Value) -> Result<DifficultyRecord, serde_json::Error> {
    let diff = RawDifficulty::deserialize(raw)?;
    Ok(DifficultyRecord {
        njs: diff.njs,
        notes: diff.notes,
        characteristic: diff.characteristic,
        difficulty: diff.difficulty,
        mods: mods_of(raw),
        environment: strip_environment(&diff.environment),
        ranked: RankedValues {
            score_saber: ranked_status(raw, "stars"),
            beat_leader: ranked_status(raw, "blStars"),
        },
    })
}

fn ranked_status(diff: &Value, field: &str) -> RankedStatus {
    match diff.get(field) {
        Some(stars) => RankedStatus {
            is_ranked: true,
            stars: stars.as_f64().unwrap_or(0.0) as f32,
        },
        None => RankedStatus::default(),
    }
}

/// ISO-8601 to epoch seconds, rounded to the nearest second.
fn epoch_seconds(id: &str, value: &str) -> Result<i64, NormalizeError> {
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|source| {
        NormalizeError::Timestamp {
            id: id.to_string(),
            value: value.to_string(),
            source,
        }
    })?;
    Ok((parsed.timestamp_millis() + 500).div_euclid(1000))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn difficulty(extra: Value) -> Value {
        let mut diff = json!({
            "njs": 16.0,
            "notes": 500,
            "characteristic": "Standard",
            "difficulty": "Expert",
            "environment": "DefaultEnvironment",
        });
        if let (Some(base), Some(extra)) = (diff.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        diff
    }

    fn raw_map(diffs: Vec<Value>) -> Value {
        json!({
            "id": "3a5f",
            "uploaded": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-02-01T12:00:00.400Z",
            "lastPublishedAt": "2024-01-15T08:30:00.600Z",
            "automapper": false,
            "declaredAi": "None",
            "metadata": {
                "duration": 184,
                "songName": "Song",
                "songSubName": "",
                "songAuthorName": "Artist",
                "levelAuthorName": "Mapper"
            },
            "stats": { "upvotes": 10, "downvotes": 2 },
            "curator": { "name": "Curator" },
            "versions": [{
                "hash": "abcdef",
                "state": "Published",
                "diffs": diffs
            }]
        })
    }

    fn accepted(raw: &Value) -> CanonicalRecord {
        match normalize(raw).unwrap() {
            Normalized::Accepted(record) => record,
            other => panic!("expected accepted record, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_basic_fields() {
        let record = accepted(&raw_map(vec![difficulty(json!({}))]));
        assert_eq!(record.id, "3a5f");
        assert_eq!(record.key, 0x3a5f);
        assert_eq!(record.hash, "abcdef");
        assert_eq!(record.duration, 184);
        assert_eq!(record.votes, Votes { up: 10, down: 2 });
        assert_eq!(record.curator_name.as_deref(), Some("Curator"));
        assert_eq!(record.song_name.as_deref(), Some("Song"));
        assert_eq!(record.song_sub_name, None);
        assert_eq!(record.difficulties.len(), 1);
    }

    #[test]
    fn test_timestamps_round_to_nearest_second() {
        let record = accepted(&raw_map(vec![]));
        // 2024-01-15T08:30:00.600Z rounds up, 2024-02-01T12:00:00.400Z rounds down
        assert_eq!(record.uploaded, 1_705_307_401);
        assert_eq!(record.last_updated, 1_706_788_800);
    }

    #[test]
    fn test_uploaded_falls_back_when_never_republished() {
        let mut raw = raw_map(vec![]);
        raw.as_object_mut().unwrap().remove("lastPublishedAt");
        let record = accepted(&raw);
        assert_eq!(record.uploaded, 1_704_067_200);
    }

    #[test]
    fn test_mod_mask_chroma_only() {
        let record = accepted(&raw_map(vec![difficulty(json!({
            "chroma": true, "cinema": false, "me": false, "ne": false, "vivify": false
        }))]));
        assert_eq!(record.mods.bits(), 4);
        assert_eq!(record.difficulties[0].mods.bits(), 4);
    }

    #[test]
    fn test_mod_mask_cinema_and_vivify() {
        let record = accepted(&raw_map(vec![
            difficulty(json!({ "cinema": true })),
            difficulty(json!({ "vivify": true })),
        ]));
        assert_eq!(record.mods.bits(), 17);
        assert_eq!(record.difficulties[0].mods, Mods::CINEMA);
        assert_eq!(record.difficulties[1].mods, Mods::VIVIFY);
    }

    #[test]
    fn test_environment_suffix_stripped() {
        assert_eq!(strip_environment("DefaultEnvironment"), "Default");
        assert_eq!(strip_environment("Weave"), "Weave");
        let record = accepted(&raw_map(vec![difficulty(json!({}))]));
        assert_eq!(record.difficulties[0].environment, "Default");
    }

    #[test]
    fn test_ranked_status_presence() {
        let record = accepted(&raw_map(vec![
            difficulty(json!({ "stars": 7.5, "blStars": 8.25 })),
            difficulty(json!({})),
            difficulty(json!({ "stars": null, "blStars": "n/a" })),
        ]));
        let ranked: Vec<RankedValues> = record.difficulties.iter().map(|d| d.ranked).collect();

        assert_eq!(ranked[0].score_saber, RankedStatus { is_ranked: true, stars: 7.5 });
        assert_eq!(ranked[0].beat_leader, RankedStatus { is_ranked: true, stars: 8.25 });
        assert_eq!(ranked[1].score_saber, RankedStatus::default());
        // present but non-numeric: still ranked, zero stars
        assert_eq!(ranked[2].score_saber, RankedStatus { is_ranked: true, stars: 0.0 });
        assert_eq!(ranked[2].beat_leader, RankedStatus { is_ranked: true, stars: 0.0 });
    }

    #[test]
    fn test_invalid_difficulty_dropped() {
        let broken = json!({ "njs": "fast", "notes": 10, "characteristic": "Standard" });
        let record = accepted(&raw_map(vec![difficulty(json!({})), broken]));
        assert_eq!(record.difficulties.len(), 1);
    }

    #[test]
    fn test_zero_difficulties_allowed() {
        let record = accepted(&raw_map(vec![json!({ "bogus": true })]));
        assert!(record.difficulties.is_empty());
    }

    #[test]
    fn test_filters_in_order() {
        let mut never = raw_map(vec![]);
        never.as_object_mut().unwrap().remove("uploaded");
        // automapper is also set, but never-published is checked first
        never["automapper"] = json!(true);
        assert_eq!(check_filters(&never), Some(Rejection::NeverPublished));

        let mut unpublished = raw_map(vec![]);
        unpublished["versions"][0]["state"] = json!("Uploaded");
        assert_eq!(check_filters(&unpublished), Some(Rejection::NotPublished));

        let mut ai = raw_map(vec![]);
        ai["declaredAi"] = json!("Uploader");
        assert_eq!(check_filters(&ai), Some(Rejection::AiGenerated));

        let mut auto = raw_map(vec![]);
        auto["automapper"] = json!(true);
        assert_eq!(check_filters(&auto), Some(Rejection::Automapper));

        assert_eq!(check_filters(&raw_map(vec![])), None);
    }

    #[test]
    fn test_rejection_keeps_identifier() {
        let mut raw = raw_map(vec![]);
        raw["automapper"] = json!(true);
        let normalized = normalize(&raw).unwrap();
        assert_eq!(
            normalized,
            Normalized::Rejected {
                id: "3a5f".to_string(),
                reason: Rejection::Automapper
            }
        );
        assert_eq!(normalized.id(), "3a5f");
    }

    #[test]
    fn test_schema_errors() {
        assert!(matches!(normalize(&json!({})), Err(NormalizeError::MissingId)));

        let mut bad_key = raw_map(vec![]);
        bad_key["id"] = json!("not-hex");
        assert!(matches!(normalize(&bad_key), Err(NormalizeError::InvalidKey { .. })));

        let mut no_stats = raw_map(vec![]);
        no_stats.as_object_mut().unwrap().remove("stats");
        assert!(matches!(normalize(&no_stats), Err(NormalizeError::Schema { .. })));

        let mut bad_time = raw_map(vec![]);
        bad_time["updatedAt"] = json!("yesterday");
        assert!(matches!(normalize(&bad_time), Err(NormalizeError::Timestamp { .. })));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = raw_map(vec![difficulty(json!({ "ne": true, "stars": 3.0 }))]);
        assert_eq!(normalize(&raw).unwrap(), normalize(&raw).unwrap());
    }
}

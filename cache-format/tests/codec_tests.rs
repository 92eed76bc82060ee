use std::fs;

use cache_format::map_data::{Difficulty, MapList, MapMetadata, RankedStatus, RankedValues, Votes};
use cache_format::{decode_snapshot, encode_snapshot, SCHEMA_VERSION};
use tempfile::tempdir;

fn sample_map() -> MapMetadata {
    MapMetadata {
        key: 0x3a5f,
        hash: "abcdef0123456789".to_string(),
        duration: 184,
        uploaded: 1_700_000_000,
        last_updated: 1_700_000_500,
        mods: 4,
        votes: Some(Votes { up: 10, down: 2 }),
        difficulties: vec![Difficulty {
            njs: 18.0,
            notes: 812,
            characteristic_name: "Standard".to_string(),
            difficulty_name: "ExpertPlus".to_string(),
            mods: 4,
            environment_name: "Default".to_string(),
            ranked: Some(RankedValues {
                score_saber: Some(RankedStatus {
                    is_ranked: true,
                    stars: 7.25,
                }),
                beat_leader: Some(RankedStatus {
                    is_ranked: false,
                    stars: 0.0,
                }),
            }),
        }],
        curator_name: None,
        song_name: Some("Song".to_string()),
        song_sub_name: None,
        song_author_name: Some("Artist".to_string()),
        level_author_name: Some("Mapper".to_string()),
    }
}

#[test]
fn snapshot_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cached.proto.gz");

    let mut list = MapList {
        schema_version: SCHEMA_VERSION,
        ..Default::default()
    };
    list.map_metadata.insert("3a5f".to_string(), sample_map());

    fs::write(&path, encode_snapshot(&list).unwrap()).unwrap();
    let decoded = decode_snapshot(&fs::read(&path).unwrap()).unwrap();

    assert_eq!(decoded.schema_version, SCHEMA_VERSION);
    let map = &decoded.map_metadata["3a5f"];
    assert_eq!(map.key, 0x3a5f);
    assert_eq!(map.song_sub_name, None);
    assert_eq!(map.song_name.as_deref(), Some("Song"));
    assert_eq!(map.difficulties.len(), 1);
    assert_eq!(map.difficulties[0].environment_name, "Default");
}

#[test]
fn empty_optional_strings_stay_absent() {
    let mut list = MapList::default();
    let mut map = sample_map();
    map.song_name = None;
    map.level_author_name = None;
    list.map_metadata.insert("1".to_string(), map);

    let decoded = decode_snapshot(&encode_snapshot(&list).unwrap()).unwrap();
    let map = &decoded.map_metadata["1"];
    assert!(map.song_name.is_none());
    assert!(map.level_author_name.is_none());
}

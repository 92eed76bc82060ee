// ABOUTME: Runs the built beatsaver-cache binary against snapshot files and configs
// ABOUTME: Checks inspect output and startup validation failures

use beatsaver_cache::snapshot::SnapshotWriter;
use beatsaver_cache::store::MirrorStore;
use serde_json::json;
use std::process::Command;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_beatsaver-cache"));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("BEATSAVER_CACHE_CONFIG");
    cmd
}

#[tokio::test]
async fn test_inspect_prints_snapshot_summary() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("cached.proto.gz");

    let mut store = MirrorStore::new();
    for id in ["1a", "2b"] {
        store
            .ingest(&json!({
                "id": id,
                "uploaded": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z",
                "metadata": { "duration": 60, "songName": "Inspect Me" },
                "stats": { "upvotes": 3, "downvotes": 1 },
                "versions": [{ "hash": "abc", "state": "Published", "diffs": [] }]
            }))
            .unwrap();
    }
    SnapshotWriter::new(&path).flush(&store).await.unwrap();

    let output = bin()
        .arg("inspect")
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    println!("stdout: {}", stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Schema version: 1"));
    assert!(stdout.contains("Maps: 2"));
    assert!(stdout.contains("1a Inspect Me (3 up / 1 down, 0 difficulties)"));
}

#[test]
fn test_inspect_missing_file_fails() {
    let temp_dir = tempdir().unwrap();
    let output = bin()
        .arg("inspect")
        .arg(temp_dir.path().join("missing.proto.gz"))
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Failed to read snapshot"));
}

#[test]
fn test_backfill_rejects_missing_config() {
    let temp_dir = tempdir().unwrap();
    let output = bin()
        .arg("backfill")
        .arg("--config")
        .arg(temp_dir.path().join("nope.toml"))
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Failed to load settings"));
}

#[test]
fn test_backfill_rejects_zero_page_size() {
    let temp_dir = tempdir().unwrap();
    let config = temp_dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();

    let output = bin()
        .arg("backfill")
        .arg("--config")
        .arg(&config)
        .arg("--page-size")
        .arg("0")
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("page_size must be greater than 0"));
}

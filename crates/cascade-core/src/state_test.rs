use super::*;

fn entry(name: &str, fingerprint: &str, status: RunStatus) -> StateEntry {
    StateEntry {
        model: ModelName::new(name),
        fingerprint: fingerprint.to_string(),
        status,
        last_successful_fingerprint: matches!(status, RunStatus::Success)
            .then(|| fingerprint.to_string()),
        last_run: Utc::now(),
        high_watermark: None,
    }
}

#[test]
fn test_open_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(dir.path(), "dev").unwrap();
    assert_eq!(store.snapshot().environment, "dev");
    assert!(store.snapshot().entries.is_empty());
}

#[test]
fn test_put_flush_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StateStore::open(dir.path(), "dev").unwrap();
    store.put(entry("silver.a", "f1", RunStatus::Success));
    store.flush().unwrap();

    let reloaded = StateStore::open(dir.path(), "dev").unwrap();
    let loaded = reloaded.get("silver.a").unwrap();
    assert_eq!(loaded.fingerprint, "f1");
    assert_eq!(loaded.status, RunStatus::Success);
    assert!(loaded.previously_materialised());
}

#[test]
fn test_environments_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut dev = StateStore::open(dir.path(), "dev").unwrap();
    dev.put(entry("a", "f1", RunStatus::Success));
    dev.flush().unwrap();

    let prod = StateStore::open(dir.path(), "prod").unwrap();
    assert!(prod.get("a").is_none());
}

#[test]
fn test_failed_entry_keeps_no_success_fingerprint() {
    let e = entry("a", "f1", RunStatus::Failed);
    assert!(!e.previously_materialised());
}

#[test]
fn test_remove_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StateStore::open(dir.path(), "dev").unwrap();
    store.put(entry("a", "f1", RunStatus::Success));
    assert!(store.remove("a").is_some());
    assert!(store.get("a").is_none());
    assert!(store.remove("a").is_none());
}

#[test]
fn test_flush_replaces_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StateStore::open(dir.path(), "dev").unwrap();
    store.put(entry("a", "f1", RunStatus::Success));
    store.flush().unwrap();

    store.put(entry("b", "f2", RunStatus::Failed));
    store.flush().unwrap();

    // No temp files left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let reloaded = StateStore::open(dir.path(), "dev").unwrap();
    assert_eq!(reloaded.snapshot().entries.len(), 2);
}

#[test]
fn test_unknown_keys_ignored() {
    // Snapshots written by other versions may carry extra keys
    let dir = tempfile::tempdir().unwrap();
    let path = StateStore::snapshot_path(dir.path(), "dev");
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(
        &path,
        r#"{
            "environment": "dev",
            "updated_at": "2024-01-01T00:00:00Z",
            "future_field": {"nested": true},
            "entries": {
                "a": {
                    "model": "a",
                    "fingerprint": "f1",
                    "status": "SUCCESS",
                    "last_run": "2024-01-01T00:00:00Z",
                    "rows_loaded": 42
                }
            }
        }"#,
    )
    .unwrap();

    let store = StateStore::open(dir.path(), "dev").unwrap();
    let loaded = store.get("a").unwrap();
    assert_eq!(loaded.fingerprint, "f1");
    assert_eq!(loaded.status, RunStatus::Success);
    assert!(loaded.high_watermark.is_none());
}

#[test]
fn test_high_watermark_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StateStore::open(dir.path(), "dev").unwrap();
    let mut e = entry("a", "f1", RunStatus::Success);
    e.high_watermark = Some("2024-06-01T12:00:00".to_string());
    store.put(e);
    store.flush().unwrap();

    let reloaded = StateStore::open(dir.path(), "dev").unwrap();
    assert_eq!(
        reloaded.get("a").unwrap().high_watermark.as_deref(),
        Some("2024-06-01T12:00:00")
    );
}

#[test]
fn test_run_status_serialisation() {
    assert_eq!(
        serde_json::to_string(&RunStatus::Success).unwrap(),
        r#""SUCCESS""#
    );
    assert_eq!(RunStatus::Failed.to_string(), "FAILED");
}

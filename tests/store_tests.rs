use malexport::records::{HistoryEvent, HistoryRecord};
use malexport::store::{read_json, EntryStore, MergedStore, ShardedStore};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

fn record(n: u32) -> HistoryRecord {
    HistoryRecord::new(format!("Entry {n}"), vec![HistoryEvent(n, 1_600_000_000)])
}

#[test]
fn test_merged_file_loses_at_most_one_flush_window() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("anime_history.json");
    let mut store: MergedStore<HistoryRecord> = MergedStore::open(&path, 3).unwrap();
    for id in 1..=7 {
        store.save(id, &record(id as u32)).unwrap();
    }

    // a crash now would leave what the last periodic flush wrote
    let on_disk: BTreeMap<u64, HistoryRecord> = read_json(&path).unwrap().unwrap();
    assert_eq!(on_disk.len(), 6);
    assert_eq!(store.pending(), 1);

    drop(store);
    let on_disk: BTreeMap<u64, HistoryRecord> = read_json(&path).unwrap().unwrap();
    assert_eq!(on_disk.len(), 7);
}

#[test]
fn test_layouts_agree_on_change_detection() {
    let temp = TempDir::new().unwrap();
    let mut sharded: ShardedStore<HistoryRecord> = ShardedStore::open(temp.path().join("history")).unwrap();
    let mut merged: MergedStore<HistoryRecord> = MergedStore::open(temp.path().join("merged.json"), 10).unwrap();
    let stores: [&mut dyn EntryStore<HistoryRecord>; 2] = [&mut sharded, &mut merged];

    for store in stores {
        assert!(!store.exists(1));
        assert!(store.save(1, &record(1)).unwrap());
        assert!(!store.save(1, &record(1)).unwrap());
        assert!(store.save(1, &record(2)).unwrap());
        assert_eq!(store.load(1).unwrap(), Some(record(2)));
        store.flush().unwrap();
    }
}

#[test]
fn test_sharded_save_leaves_no_temporary_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("history");
    let mut store: ShardedStore<HistoryRecord> = ShardedStore::open(&dir).unwrap();
    for id in 1..=5 {
        store.save(id, &record(id as u32)).unwrap();
    }

    let names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names.len(), 5);
    assert!(names.iter().all(|n| n.ends_with(".json") && !n.starts_with('.')));
}

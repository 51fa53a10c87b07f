use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{read_json, write_json_atomic, EntryStore};
use crate::change::has_changed;
use crate::error::SyncResult;
use crate::records::Record;

/// All records of one kind in a single `{id: record}` JSON file.
///
/// Saves are buffered in memory and written out every `flush_every` saves and
/// when the store is dropped, so a crash loses at most `flush_every - 1`
/// records.
pub struct MergedStore<R: Record> {
    path: PathBuf,
    records: BTreeMap<u64, R>,
    flush_every: usize,
    pending: usize,
}

impl<R: Record> MergedStore<R> {
    pub fn open(path: impl Into<PathBuf>, flush_every: usize) -> SyncResult<Self> {
        let path = path.into();
        let records = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            records,
            flush_every: flush_every.max(1),
            pending: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves not yet written to disk
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R: Record> EntryStore<R> for MergedStore<R> {
    fn exists(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    fn load(&self, id: u64) -> SyncResult<Option<R>> {
        Ok(self.records.get(&id).cloned())
    }

    fn save(&mut self, id: u64, record: &R) -> SyncResult<bool> {
        let changed = has_changed(self.records.get(&id), record);
        self.records.insert(id, record.clone());
        self.pending += 1;
        if self.pending >= self.flush_every {
            self.flush()?;
        }
        Ok(changed)
    }

    fn ids(&self) -> SyncResult<Vec<u64>> {
        Ok(self.records.keys().copied().collect())
    }

    fn flush(&mut self) -> SyncResult<()> {
        log::debug!(
            "Writing {} records ({} new saves) to {}",
            self.records.len(),
            self.pending,
            self.path.display()
        );
        write_json_atomic(&self.path, &self.records)?;
        self.pending = 0;
        Ok(())
    }
}

impl<R: Record> Drop for MergedStore<R> {
    fn drop(&mut self) {
        if self.pending == 0 {
            return;
        }
        if let Err(e) = self.flush() {
            log::error!("Failed to write {} on exit: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{HistoryEvent, HistoryRecord};
    use tempfile::TempDir;

    fn record(n: u32) -> HistoryRecord {
        HistoryRecord::new(format!("entry {n}"), vec![HistoryEvent(n, n as i64 * 100)])
    }

    #[test]
    fn test_flushes_every_k_saves() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("anime_history.json");
        let mut store: MergedStore<HistoryRecord> = MergedStore::open(&path, 3).unwrap();

        store.save(1, &record(1)).unwrap();
        store.save(2, &record(2)).unwrap();
        assert!(!path.exists());
        store.save(3, &record(3)).unwrap();
        assert!(path.exists());
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_flush_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manga_history.json");
        {
            let mut store: MergedStore<HistoryRecord> = MergedStore::open(&path, 10).unwrap();
            store.save(7, &record(7)).unwrap();
        }
        let reopened: MergedStore<HistoryRecord> = MergedStore::open(&path, 10).unwrap();
        assert_eq!(reopened.load(7).unwrap(), Some(record(7)));
    }

    #[test]
    fn test_crash_loses_only_unflushed_saves() {
        const K: usize = 4;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("anime_history.json");

        let mut store: MergedStore<HistoryRecord> = MergedStore::open(&path, K).unwrap();
        for id in 0..(K + K / 2) as u64 {
            store.save(id, &record(id as u32)).unwrap();
        }
        assert_eq!(store.pending(), K / 2);
        // simulate a crash: no drop, no exit flush
        std::mem::forget(store);

        let reopened: MergedStore<HistoryRecord> = MergedStore::open(&path, K).unwrap();
        assert_eq!(reopened.ids().unwrap(), (0..K as u64).collect::<Vec<_>>());
        for id in 0..K as u64 {
            assert_eq!(reopened.load(id).unwrap(), Some(record(id as u32)));
        }
    }

    #[test]
    fn test_rerun_unchanged_reports_no_change() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("anime_history.json");
        {
            let mut store: MergedStore<HistoryRecord> = MergedStore::open(&path, 10).unwrap();
            assert!(store.save(1, &record(1)).unwrap());
        }
        let mut store: MergedStore<HistoryRecord> = MergedStore::open(&path, 10).unwrap();
        assert!(!store.save(1, &record(1)).unwrap());
        assert!(store.exists(1));
        assert!(!store.exists(2));
    }
}

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use super::{read_json, write_json_atomic, EntryStore};
use crate::change::has_changed;
use crate::error::SyncResult;
use crate::records::Record;

/// One `{id}.json` file per record inside `dir`
pub struct ShardedStore<R> {
    dir: PathBuf,
    _record: PhantomData<R>,
}

impl<R: Record> ShardedStore<R> {
    pub fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            _record: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl<R: Record> EntryStore<R> for ShardedStore<R> {
    fn exists(&self, id: u64) -> bool {
        self.entry_path(id).exists()
    }

    fn load(&self, id: u64) -> SyncResult<Option<R>> {
        let path = self.entry_path(id);
        match read_json(&path) {
            Ok(record) => Ok(record),
            Err(crate::error::SyncError::Json(e)) => {
                log::warn!("Ignoring unreadable record {}: {}", path.display(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn save(&mut self, id: u64, record: &R) -> SyncResult<bool> {
        let old = self.load(id)?;
        let changed = has_changed(old.as_ref(), record);
        write_json_atomic(&self.entry_path(id), record)?;
        Ok(changed)
    }

    fn ids(&self) -> SyncResult<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            // index.json and friends live next to numbered files in some layouts
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn flush(&mut self) -> SyncResult<()> {
        Ok(())
    }
}

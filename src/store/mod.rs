//! Per-id persistence of fetched records.
//!
//! Two layouts are supported and behave the same to callers:
//! - **sharded**: one JSON file per id inside a directory
//! - **merged**: one JSON file per resource kind mapping id to record,
//!   flushed every few saves and when the store is dropped

mod merged;
mod sharded;

pub use merged::MergedStore;
pub use sharded::ShardedStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::error::SyncResult;
use crate::records::Record;

/// Storage of the last-known-good record for each id
pub trait EntryStore<R: Record> {
    /// Whether a record has ever been saved for `id`
    fn exists(&self, id: u64) -> bool;

    /// Load the stored record for `id`, if any
    fn load(&self, id: u64) -> SyncResult<Option<R>>;

    /// Replace the record for `id`. Returns whether it differed from the
    /// stored one. The record is written even when unchanged.
    fn save(&mut self, id: u64, record: &R) -> SyncResult<bool>;

    /// Every stored id, ascending
    fn ids(&self) -> SyncResult<Vec<u64>>;

    /// Persist anything still buffered
    fn flush(&mut self) -> SyncResult<()>;
}

/// Write `value` as JSON to `path`, replacing any previous file in one step.
///
/// Content goes to a sibling temporary file which is then renamed over the
/// target, so readers see either the old or the new file, never a torn one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data.json".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let content = serde_json::to_vec(value)?;
    if let Err(e) = fs::write(&tmp, content) {
        fs::remove_file(&tmp).ok();
        return Err(e.into());
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON file, returning `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> SyncResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

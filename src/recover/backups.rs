use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::SyncResult;

/// An extracted snapshot of one account directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub name: String,
    pub path: PathBuf,
}

/// Every backup directly under `root`, oldest first.
///
/// Backups are named so that lexical order is chronological
/// (e.g. `20210101T000000Z`). Plain files next to them are ignored.
pub fn discover_backups(root: &Path) -> SyncResult<Vec<Backup>> {
    let mut backups = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        backups.push(Backup {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path().to_path_buf(),
        });
    }
    backups.sort_by(|a, b| a.name.cmp(&b.name));
    log::debug!("Found {} backups under {}", backups.len(), root.display());
    Ok(backups)
}

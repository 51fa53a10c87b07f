//! Reconstruct entries the site has since deleted, from a series of backups.
//!
//! Backups are walked newest first. An entry whose id is no longer in the
//! approved set is taken from the first (most recent) backup that still has
//! it, since older snapshots may hold less complete data for it.

mod approved;
mod backups;
mod combine;

pub use approved::{load_approved, ApprovedIds, IdCacheRepo, ID_CACHE_REPO_URL};
pub use backups::{discover_backups, Backup};
pub use combine::{CombinedEntry, CombinedView, Combiner, StoreCombiner};

use serde::Serialize;
use std::collections::HashSet;

use crate::list_type::ListType;

/// Deleted entries found across all backups, most recent version of each
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveredEntries {
    pub anime: Vec<CombinedEntry>,
    pub manga: Vec<CombinedEntry>,
}

impl RecoveredEntries {
    pub fn entries(&self, list_type: ListType) -> &[CombinedEntry] {
        match list_type {
            ListType::Anime => &self.anime,
            ListType::Manga => &self.manga,
        }
    }

    pub fn len(&self) -> usize {
        self.anime.len() + self.manga.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, entry: CombinedEntry) {
        match entry.list_type {
            ListType::Anime => self.anime.push(entry),
            ListType::Manga => self.manga.push(entry),
        }
    }
}

/// Collect entries missing from `approved` out of `backups` (oldest first).
///
/// With `only_with_history`, entries that never had an episode/chapter
/// logged are left out. A backup that cannot be combined is logged and
/// skipped.
pub fn recover<C: Combiner + ?Sized>(
    combiner: &C,
    approved: &ApprovedIds,
    backups: &[Backup],
    username: &str,
    only_with_history: bool,
) -> RecoveredEntries {
    let mut recovered = RecoveredEntries::default();
    let mut seen: HashSet<(ListType, u64)> = HashSet::new();

    for backup in backups.iter().rev() {
        let view = match combiner.combine(&backup.path, username) {
            Ok(view) => view,
            Err(e) => {
                log::warn!("Skipping backup {}: {}", backup.name, e);
                continue;
            }
        };
        log::debug!("Checking backup {}", backup.name);
        for list_type in ListType::ALL {
            for (id, entry) in view.entries(list_type) {
                if approved.contains(list_type, *id) {
                    continue;
                }
                if only_with_history && !entry.has_history() {
                    continue;
                }
                if seen.insert((list_type, *id)) {
                    log::info!("Recovered {} {} ({}) from {}", list_type, id, entry.title, backup.name);
                    recovered.push(entry.clone());
                }
            }
        }
    }
    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SyncError, SyncResult};
    use crate::records::HistoryEvent;
    use std::collections::{BTreeMap, HashMap};
    use std::path::{Path, PathBuf};

    /// Combined views keyed by backup path
    struct FakeCombiner {
        views: HashMap<PathBuf, CombinedView>,
    }

    impl Combiner for FakeCombiner {
        fn combine(&self, account_dir: &Path, _username: &str) -> SyncResult<CombinedView> {
            self.views
                .get(account_dir)
                .cloned()
                .ok_or_else(|| SyncError::Precondition(format!("no data in {}", account_dir.display())))
        }
    }

    fn entry(id: u64, title: &str, history: Vec<HistoryEvent>) -> CombinedEntry {
        CombinedEntry {
            id,
            list_type: ListType::Anime,
            title: title.to_string(),
            list_entry: None,
            api_entry: None,
            history,
        }
    }

    fn view(entries: Vec<CombinedEntry>) -> CombinedView {
        CombinedView {
            anime: entries.into_iter().map(|e| (e.id, e)).collect::<BTreeMap<_, _>>(),
            manga: BTreeMap::new(),
        }
    }

    fn backup(name: &str) -> Backup {
        Backup {
            name: name.to_string(),
            path: PathBuf::from(name),
        }
    }

    #[test]
    fn test_most_recent_surviving_version_wins() {
        let combiner = FakeCombiner {
            views: HashMap::from([
                (PathBuf::from("b1"), view(vec![entry(42, "old", vec![]), entry(7, "kept", vec![])])),
                (PathBuf::from("b2"), view(vec![entry(42, "newer", vec![HistoryEvent(3, 30)])])),
                (PathBuf::from("b3"), view(vec![entry(7, "kept", vec![])])),
            ]),
        };
        let approved = ApprovedIds {
            anime: HashSet::from([7]),
            manga: HashSet::new(),
        };
        let recovered = recover(&combiner, &approved, &[backup("b1"), backup("b2"), backup("b3")], "u", false);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered.anime[0].id, 42);
        assert_eq!(recovered.anime[0].title, "newer");
    }

    #[test]
    fn test_only_with_history_filters() {
        let combiner = FakeCombiner {
            views: HashMap::from([(
                PathBuf::from("b1"),
                view(vec![entry(1, "watched", vec![HistoryEvent(1, 10)]), entry(2, "never", vec![])]),
            )]),
        };
        let recovered = recover(&combiner, &ApprovedIds::default(), &[backup("b1")], "u", true);
        assert_eq!(recovered.entries(ListType::Anime).iter().map(|e| e.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_unreadable_backup_is_skipped() {
        let combiner = FakeCombiner {
            views: HashMap::from([(PathBuf::from("b1"), view(vec![entry(5, "x", vec![])]))]),
        };
        let recovered = recover(&combiner, &ApprovedIds::default(), &[backup("b1"), backup("broken")], "u", false);
        assert_eq!(recovered.anime.len(), 1);
        assert!(recovered.manga.is_empty());
    }
}

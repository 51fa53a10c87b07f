//! Join everything one snapshot knows about each entry: the list row, the API
//! list node and the episode/chapter history.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SyncResult;
use crate::list_type::ListType;
use crate::localdir::LocalDir;
use crate::parse::load_history_records;
use crate::records::{HistoryEvent, ListEntry};
use crate::store::read_json;
use crate::sync::{export_ids, load_list};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedEntry {
    pub id: u64,
    pub list_type: ListType,
    pub title: String,
    pub list_entry: Option<ListEntry>,
    pub api_entry: Option<Value>,
    pub history: Vec<HistoryEvent>,
}

impl CombinedEntry {
    fn new(id: u64, list_type: ListType) -> Self {
        Self {
            id,
            list_type,
            title: String::new(),
            list_entry: None,
            api_entry: None,
            history: Vec::new(),
        }
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Combined entries of one snapshot, by id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedView {
    pub anime: BTreeMap<u64, CombinedEntry>,
    pub manga: BTreeMap<u64, CombinedEntry>,
}

impl CombinedView {
    pub fn entries(&self, list_type: ListType) -> &BTreeMap<u64, CombinedEntry> {
        match list_type {
            ListType::Anime => &self.anime,
            ListType::Manga => &self.manga,
        }
    }

    fn entries_mut(&mut self, list_type: ListType) -> &mut BTreeMap<u64, CombinedEntry> {
        match list_type {
            ListType::Anime => &mut self.anime,
            ListType::Manga => &mut self.manga,
        }
    }
}

fn entry_for(entries: &mut BTreeMap<u64, CombinedEntry>, id: u64, list_type: ListType) -> &mut CombinedEntry {
    entries.entry(id).or_insert_with(|| CombinedEntry::new(id, list_type))
}

/// Builds the combined view of an account directory
pub trait Combiner {
    fn combine(&self, account_dir: &Path, username: &str) -> SyncResult<CombinedView>;
}

/// Reads the files the sync engine writes
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCombiner;

impl StoreCombiner {
    fn combine_type(localdir: &LocalDir, list_type: ListType, view: &mut CombinedView) -> SyncResult<()> {
        let entries = view.entries_mut(list_type);
        for id in export_ids(&localdir.export_path(list_type), list_type)?.unwrap_or_default() {
            entry_for(entries, id, list_type);
        }

        for row in load_list(&localdir.list_path(list_type))?.unwrap_or_default() {
            let Some(id) = row.id(list_type) else {
                continue;
            };
            let entry = entry_for(entries, id, list_type);
            if let Some(title) = row.title(list_type) {
                entry.title = title.to_string();
            }
            entry.list_entry = Some(row);
        }

        let api_nodes: Vec<Value> = read_json(&localdir.api_list_path(list_type))?.unwrap_or_default();
        for node in api_nodes {
            let Some(id) = node.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let entry = entry_for(entries, id, list_type);
            if entry.title.is_empty() {
                if let Some(title) = node.get("title").and_then(Value::as_str) {
                    entry.title = title.to_string();
                }
            }
            entry.api_entry = Some(node);
        }

        for (id, record) in load_history_records(localdir, list_type)? {
            let entry = entry_for(entries, id, list_type);
            if entry.title.is_empty() {
                entry.title = record.title;
            }
            entry.history = record.episodes;
        }
        Ok(())
    }
}

impl Combiner for StoreCombiner {
    fn combine(&self, account_dir: &Path, username: &str) -> SyncResult<CombinedView> {
        // config_root is unused when only reading data files
        let localdir = LocalDir::for_account_dir(account_dir, account_dir, username);
        let mut view = CombinedView::default();
        for list_type in ListType::ALL {
            Self::combine_type(&localdir, list_type, &mut view)?;
        }
        Ok(view)
    }
}

//! Whole-list syncs. Both list endpoints are cheap to page through, so every
//! run re-fetches everything and replaces the file on disk.

use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::SyncReport;
use crate::error::{SyncError, SyncResult};
use crate::list_type::{ListType, ResourceKind};
use crate::paginator::{ConvergingPaginator, Page};
use crate::records::ListEntry;
use crate::store::{read_json, write_json_atomic};
use crate::transport::{api_pages, JsonApi};

/// Rows per page of the `load.json` endpoint
pub const LIST_PAGE_SIZE: usize = 300;

const API_LIST_FIELDS: &str = "id,title,main_picture,alternative_titles,start_date,end_date,synopsis,mean,rank,popularity,num_list_users,num_scoring_users,nsfw,created_at,updated_at,media_type,status,genres,my_list_status,num_episodes,start_season,broadcast,source,average_episode_duration,rating,pictures,background,related_anime,related_manga,recommendations,studios,statistics";

/// `order=5` sorts by most recently edited, which history sync relies on
fn list_url(list_type: ListType, username: &str, offset: usize) -> String {
    format!("https://myanimelist.net/{list_type}list/{username}/load.json?status=7&order=5&offset={offset}")
}

fn api_list_url(list_type: ListType, username: &str) -> String {
    format!(
        "https://api.myanimelist.net/v2/users/{username}/{list_type}list?limit=100&offset=0&nsfw=true&fields={API_LIST_FIELDS}"
    )
}

fn decode_rows(url: &str, value: Value) -> SyncResult<Vec<ListEntry>> {
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| SyncError::parse(ResourceKind::ListEntry, None, format!("{url}: {e}")))
            })
            .collect(),
        other => Err(SyncError::parse(
            ResourceKind::ListEntry,
            None,
            format!("{url}: expected an array of rows, got {}", short_kind(&other)),
        )),
    }
}

fn short_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Page through the whole `load.json` list and replace `path` with it
pub fn update_list<A: JsonApi + ?Sized>(
    api: &mut A,
    list_type: ListType,
    username: &str,
    path: &Path,
) -> SyncResult<SyncReport> {
    let mut report = SyncReport::new(format!("{list_type} list"));
    let pages = ConvergingPaginator::offset(0usize, LIST_PAGE_SIZE, |offset: &usize| {
        let url = list_url(list_type, username, *offset);
        let rows = decode_rows(&url, api.get_json(&url)?)?;
        Ok(Page::new(rows, Some(offset + LIST_PAGE_SIZE)))
    });
    let rows: Vec<ListEntry> = pages.collect::<SyncResult<_>>()?;

    let previous: Option<Vec<ListEntry>> = read_json(path).unwrap_or(None);
    report.fetched = rows.len();
    if previous.as_ref() == Some(&rows) {
        report.unchanged = rows.len();
    } else {
        report.changed = rows.len();
    }
    log::info!("Saving {} {} list entries to {}", rows.len(), list_type, path.display());
    write_json_atomic(path, &rows)?;
    Ok(report)
}

/// Page through the authenticated API list, storing each item's `node`
pub fn update_api_list<A: JsonApi + ?Sized>(
    api: &mut A,
    list_type: ListType,
    username: &str,
    path: &Path,
) -> SyncResult<SyncReport> {
    let mut report = SyncReport::new(format!("{list_type} API list"));
    let url = api_list_url(list_type, username);
    let mut nodes: Vec<Value> = Vec::new();
    for page in api_pages(api, &url) {
        let page = page?;
        let items = page.as_array().ok_or_else(|| {
            SyncError::parse(ResourceKind::ListEntry, None, format!("{url}: 'data' is not an array"))
        })?;
        for item in items {
            match item.get("node") {
                Some(node) => nodes.push(node.clone()),
                None => report.record_skip(&SyncError::parse(
                    ResourceKind::ListEntry,
                    None,
                    "API list item has no 'node'",
                )),
            }
        }
    }
    report.fetched = nodes.len();
    report.changed = nodes.len();
    write_json_atomic(path, &nodes)?;
    Ok(report)
}

/// Load a saved `load.json` list, if present
pub fn load_list(path: &Path) -> SyncResult<Option<Vec<ListEntry>>> {
    read_json(path)
}

/// Ids from an XML list export (`series_animedb_id` / `manga_mangadb_id`),
/// in file order. `None` if the export does not exist.
pub fn export_ids(path: &Path, list_type: ListType) -> SyncResult<Option<Vec<u64>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let tag = match list_type {
        ListType::Anime => "series_animedb_id",
        ListType::Manga => "manga_mangadb_id",
    };
    let pattern = Regex::new(&format!(r"<{tag}>\s*(\d+)\s*</{tag}>"))
        .map_err(|e| SyncError::Precondition(e.to_string()))?;
    let ids = pattern
        .captures_iter(&content)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    Ok(Some(ids))
}

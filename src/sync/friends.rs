use serde_json::Value;
use std::path::Path;

use super::SyncReport;
use crate::error::SyncResult;
use crate::paginator::{ConvergingPaginator, Page};
use crate::store::write_json_atomic;
use crate::transport::JsonApi;

/// Friends per page of the Jikan endpoint
pub const FRIEND_PAGE_SIZE: usize = 100;

pub fn friend_page_url(username: &str, page: usize) -> String {
    if page <= 1 {
        format!("https://api.jikan.moe/v3/user/{username}/friends")
    } else {
        format!("https://api.jikan.moe/v3/user/{username}/friends/{page}")
    }
}

/// Page through the user's friends and replace `path` with them.
///
/// A failing page ends the walk with whatever was collected so far. If
/// nothing was collected the existing file is left alone, so a failed run
/// never erases good data.
pub fn update_friends<A: JsonApi + ?Sized>(api: &mut A, username: &str, path: &Path) -> SyncResult<SyncReport> {
    let mut report = SyncReport::new("friends");
    let pages = ConvergingPaginator::offset(1usize, FRIEND_PAGE_SIZE, |page: &usize| {
        let mut response = api.get_json(&friend_page_url(username, *page))?;
        let friends = match response.get_mut("friends").map(Value::take) {
            Some(Value::Array(friends)) => friends,
            _ => Vec::new(),
        };
        Ok(Page::new(friends, Some(page + 1)))
    });

    let mut friends: Vec<Value> = Vec::new();
    for friend in pages {
        match friend {
            Ok(friend) => friends.push(friend),
            Err(e) => {
                log::warn!("Stopping friend pagination: {}", e);
                break;
            }
        }
    }

    if friends.is_empty() {
        log::info!("No friends found for {}, skipping write to file...", username);
        return Ok(report);
    }
    report.fetched = friends.len();
    report.changed = friends.len();
    write_json_atomic(path, &friends)?;
    Ok(report)
}

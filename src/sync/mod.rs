// Module declarations
mod forum;
mod friends;
mod history;
mod lists;
mod messages;

// Re-export public types and functions
pub use forum::{ForumSync, FORUM_INDEX_FEEDS};
pub use friends::{friend_page_url, update_friends, FRIEND_PAGE_SIZE};
pub use history::{
    parse_history_page, parse_history_row, BrowserHistorySource, HistoryCandidates, HistorySource,
    HistorySync,
};
pub use lists::{
    export_ids, load_list, update_api_list, update_list, LIST_PAGE_SIZE,
};
pub use messages::{interleave_longest, parse_message_date, BrowserMessageSource, MessageSource, MessageSync};

use colored::Colorize;
use reqwest::Url;
use serde::Serialize;

use crate::error::{SyncError, SyncResult};

/// Re-authenticate at most once per failing request
pub(crate) const REAUTH_ATTEMPTS: u32 = 2;

pub const SITE_ROOT: &str = "https://myanimelist.net/";

/// What one strategy run did, for the summary printed after each update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// e.g. "anime history", "forum"
    pub label: String,

    /// Items requested from the remote
    pub fetched: usize,

    /// Items whose stored record was created or replaced with different data
    pub changed: usize,

    /// Items that matched the stored record, or were skipped as already seen
    pub unchanged: usize,

    /// Items dropped because of an item-local error
    pub skipped: Vec<String>,
}

impl SyncReport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn record_fetch(&mut self, changed: bool) {
        self.fetched += 1;
        if changed {
            self.changed += 1;
        } else {
            self.unchanged += 1;
        }
    }

    pub fn record_skip(&mut self, err: &SyncError) {
        log::warn!("Skipping: {}", err);
        self.skipped.push(err.to_string());
    }

    /// Print a one-line colored summary
    pub fn print_summary(&self) {
        let mut line = format!(
            "{} {}: {} fetched, {} changed, {} unchanged",
            "✓".green(),
            self.label.bold(),
            self.fetched,
            self.changed.to_string().green(),
            self.unchanged
        );
        if !self.skipped.is_empty() {
            line.push_str(&format!(", {} skipped", self.skipped.len().to_string().yellow()));
        }
        println!("{line}");
        for reason in &self.skipped {
            println!("    {} {}", "-".yellow(), reason);
        }
    }
}

pub(crate) fn is_auth_expired(err: &SyncError) -> bool {
    matches!(err, SyncError::AuthExpired(_))
}

/// Outcome of an item-level step: errors local to the item become a skip,
/// anything else aborts the scan.
pub(crate) fn skip_item_local<T>(report: &mut SyncReport, result: SyncResult<T>) -> SyncResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_item_local() => {
            report.record_skip(&e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Pull a numeric query parameter (`id`, `threadid`) out of a URL or a
/// site-relative link
pub fn query_id(link: &str, key: &str) -> Option<u64> {
    let url = Url::parse(SITE_ROOT).ok()?.join(link).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
}

/// Resolve a site-relative link to an absolute URL
pub fn site_url(link: &str) -> String {
    Url::parse(SITE_ROOT)
        .and_then(|base| base.join(link))
        .map(String::from)
        .unwrap_or_else(|_| link.to_string())
}

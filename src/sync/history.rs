//! Episode/chapter history, scraped one entry at a time from a logged-in
//! browser session.
//!
//! A run composes three candidate sources, in order:
//! 1. cold ids: on the list (or in the XML export) but never fetched
//! 2. the list in most-recently-edited order, until `till_same_limit`
//!    consecutive entries come back unchanged
//! 3. ids linked from the user's recent history page, optionally capped
//!
//! An id is fetched at most once per run.

use chrono::{Local, NaiveDate, TimeZone};
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

use super::{is_auth_expired, query_id, skip_item_local, SyncReport, REAUTH_ATTEMPTS};
use crate::credentials::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::limiter::UnchangedRunLimiter;
use crate::list_type::{ListType, ResourceKind};
use crate::localdir::LocalDir;
use crate::records::{list_ids, HistoryEvent, HistoryRecord};
use crate::retry::with_reauth;
use crate::store::EntryStore;
use crate::transport::{ensure_session, login, Browser, Locator};

use super::lists::{export_ids, load_list};

/// Where history pages come from
pub trait HistorySource {
    /// History for one list entry
    fn fetch_history(&mut self, list_type: ListType, id: u64) -> SyncResult<HistoryRecord>;

    /// Ids on the user's recent history page, most recent first, deduplicated
    fn recent_history_ids(&mut self, list_type: ListType) -> SyncResult<Vec<u64>>;

    /// Log in, unless the session already is
    fn authenticate(&mut self) -> SyncResult<()>;

    /// Drop the current session and log in again
    fn reauthenticate(&mut self) -> SyncResult<()>;
}

/// Ids to consider, from whichever local list file exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCandidates {
    /// Ids from the `load.json` list, most recently edited first
    List(Vec<u64>),
    /// Ids from an XML export; only used to find cold ids
    Export(Vec<u64>),
}

impl HistoryCandidates {
    /// Prefer the list file, fall back to the XML export. Fails before any
    /// request is made if neither exists.
    pub fn load(localdir: &LocalDir, list_type: ListType) -> SyncResult<Self> {
        let list_path = localdir.list_path(list_type);
        match load_list(&list_path) {
            Ok(Some(entries)) => return Ok(HistoryCandidates::List(list_ids(&entries, list_type))),
            Ok(None) => {}
            Err(e) => log::warn!("Could not read {}: {}", list_path.display(), e),
        }
        let export_path = localdir.export_path(list_type);
        if let Some(ids) = export_ids(&export_path, list_type)? {
            return Ok(HistoryCandidates::Export(ids));
        }
        Err(SyncError::Precondition(format!(
            "Neither {} (lists) or {} (export) exist, need one to update history",
            list_path.display(),
            export_path.display()
        )))
    }
}

/// One history sync run for one list type
pub struct HistorySync<'a, S: HistorySource + ?Sized> {
    list_type: ListType,
    source: &'a mut S,
    store: &'a mut dyn EntryStore<HistoryRecord>,
    till_same_limit: usize,
    already_requested: HashSet<u64>,
    report: SyncReport,
}

impl<'a, S: HistorySource + ?Sized> HistorySync<'a, S> {
    pub fn new(
        list_type: ListType,
        source: &'a mut S,
        store: &'a mut dyn EntryStore<HistoryRecord>,
        till_same_limit: usize,
    ) -> Self {
        Self {
            list_type,
            source,
            store,
            till_same_limit,
            already_requested: HashSet::new(),
            report: SyncReport::new(format!("{list_type} history")),
        }
    }

    /// Run all three phases. `count` caps how many recent-history ids are
    /// requested; `None` requests all of them.
    pub fn run(mut self, candidates: HistoryCandidates, count: Option<usize>) -> SyncResult<SyncReport> {
        let (all_ids, scan_ids) = match candidates {
            HistoryCandidates::List(ids) => (ids.clone(), ids),
            HistoryCandidates::Export(ids) => (ids, Vec::new()),
        };
        self.source.authenticate()?;

        log::info!("Requesting any items which don't exist in history...");
        let cold: Vec<u64> = all_ids.into_iter().filter(|id| !self.store.exists(*id)).collect();
        for id in cold {
            let outcome = self.update_entry(id);
            skip_item_local(&mut self.report, outcome)?;
        }

        if !scan_ids.is_empty() {
            log::info!("Requesting items till we hit some amount of unchanged data...");
            let mut limiter = UnchangedRunLimiter::new(self.till_same_limit);
            for id in scan_ids {
                if !limiter.should_continue() {
                    break;
                }
                log::info!("Requesting {} more entries...", limiter.remaining());
                let outcome = self.update_entry(id);
                if let Some(changed) = skip_item_local(&mut self.report, outcome)? {
                    if changed {
                        log::debug!("{} {} had new data, resetting...", self.list_type, id);
                    } else {
                        log::debug!("{} {} matched old data, decrementing...", self.list_type, id);
                    }
                    limiter.observe(changed);
                }
            }
        }

        let list_type = self.list_type;
        let recent = with_reauth(
            &mut *self.source,
            REAUTH_ATTEMPTS,
            is_auth_expired,
            |s| s.recent_history_ids(list_type),
            |s| s.reauthenticate(),
        )?;
        match count {
            Some(n) => log::info!("Requesting {} first items from user history", n),
            None => log::info!("Requesting all items from user history"),
        }
        for id in recent.into_iter().take(count.unwrap_or(usize::MAX)) {
            let outcome = self.update_entry(id);
            skip_item_local(&mut self.report, outcome)?;
        }

        self.store.flush()?;
        Ok(self.report)
    }

    /// Fetch and save one entry. Returns whether the stored record changed;
    /// an id already requested this run, successfully or not, counts as
    /// unchanged without a fetch.
    fn update_entry(&mut self, id: u64) -> SyncResult<bool> {
        if !self.already_requested.insert(id) {
            log::debug!("{} has already been requested, skipping...", id);
            return Ok(false);
        }
        let list_type = self.list_type;
        log::info!("Requesting history data for {} {}", list_type, id);
        let record = with_reauth(
            &mut *self.source,
            REAUTH_ATTEMPTS,
            is_auth_expired,
            |s| s.fetch_history(list_type, id),
            |s| s.reauthenticate(),
        )?;
        // saved even without any episodes, so the next run has something to compare
        let changed = self.store.save(id, &record)?;
        self.report.record_fetch(changed);
        Ok(changed)
    }
}

fn history_url(list_type: ListType, id: u64) -> String {
    let letter = match list_type {
        ListType::Anime => 'a',
        ListType::Manga => 'm',
    };
    format!(
        "https://myanimelist.net/ajaxtb.php?keepThis=true&detailed{letter}id={id}&TB_iframe=true&height=420&width=390"
    )
}

fn history_row_pattern(list_type: ListType) -> Option<Regex> {
    let pattern = match list_type {
        ListType::Anime => r"^Ep (\d+), watched on (\d+)/(\d+)/(\d+) at (\d+):(\d+)",
        ListType::Manga => r"^Chapter (\d+), read on (\d+)/(\d+)/(\d+) at (\d+):(\d+)",
    };
    Regex::new(pattern).ok()
}

/// Parse one history row, e.g. `Ep 5, watched on 04/20/2021 at 18:02`.
/// The date is in the site's local time.
pub fn parse_history_row(list_type: ListType, text: &str) -> Option<HistoryEvent> {
    match_history_row(&history_row_pattern(list_type)?, text)
}

fn match_history_row(pattern: &Regex, text: &str) -> Option<HistoryEvent> {
    let caps = pattern.captures(text.trim())?;
    let num = |i: usize| caps[i].parse::<u32>().ok();
    let number = num(1)?;
    let date = NaiveDate::from_ymd_opt(caps[4].parse().ok()?, num(2)?, num(3)?)?;
    let naive = date.and_hms_opt(num(5)?, num(6)?, 0)?;
    let at = Local.from_local_datetime(&naive).earliest()?.timestamp();
    Some(HistoryEvent(number, at))
}

/// Build a record from the scraped header and row texts
pub fn parse_history_page(
    list_type: ListType,
    id: u64,
    headers: &[String],
    rows: &[String],
) -> SyncResult<HistoryRecord> {
    let header = match headers {
        [single] => single,
        _ => {
            return Err(SyncError::parse(
                ResourceKind::HistoryEntry,
                Some(id),
                format!("found {} header elements, expected 1", headers.len()),
            ))
        }
    };
    // "<title> Episode Details" / "<title> Chapter Details"
    let tokens: Vec<&str> = header.lines().next().unwrap_or_default().split_whitespace().collect();
    let title = tokens[..tokens.len().saturating_sub(2)].join(" ");

    let pattern = history_row_pattern(list_type)
        .ok_or_else(|| SyncError::parse(ResourceKind::HistoryEntry, Some(id), "invalid row pattern"))?;
    let episodes = rows
        .iter()
        .map(|row| {
            match_history_row(&pattern, row).ok_or_else(|| {
                SyncError::parse(
                    ResourceKind::HistoryEntry,
                    Some(id),
                    format!("could not match episode/chapter/date out of '{row}'"),
                )
            })
        })
        .collect::<SyncResult<Vec<_>>>()?;
    Ok(HistoryRecord::new(title, episodes))
}

/// History pages read through a logged-in browser
pub struct BrowserHistorySource<'a> {
    browser: &'a mut dyn Browser,
    credentials: &'a Credentials,
}

impl<'a> BrowserHistorySource<'a> {
    pub fn new(browser: &'a mut dyn Browser, credentials: &'a Credentials) -> Self {
        Self { browser, credentials }
    }
}

impl HistorySource for BrowserHistorySource<'_> {
    fn fetch_history(&mut self, list_type: ListType, id: u64) -> SyncResult<HistoryRecord> {
        let (container, row_prefix) = match list_type {
            ListType::Anime => ("epdetails", "eprow"),
            ListType::Manga => ("chapdetails", "chaprow"),
        };
        self.browser.navigate(&history_url(list_type, id))?;
        ensure_session(self.browser)?;
        self.browser
            .wait_for_text(&Locator::css(format!("#{container}")), "Details", Duration::from_secs(10))
            .map_err(|e| SyncError::parse(ResourceKind::HistoryEntry, Some(id), e.to_string()))?;

        let headers = self.browser.find_texts(&Locator::xpath(format!(
            "//div[@id='{container}']//div[contains(text(), 'Details')]"
        )))?;
        let rows = self.browser.find_texts(&Locator::xpath(format!(
            "//div[@id='{container}']//div[starts-with(@id, '{row_prefix}')]"
        )))?;
        let record = parse_history_page(list_type, id, &headers, &rows)?;
        log::debug!("{:?}", record);
        Ok(record)
    }

    fn recent_history_ids(&mut self, list_type: ListType) -> SyncResult<Vec<u64>> {
        log::info!("Downloading recent user {} history", list_type);
        let url = format!("https://myanimelist.net/history/{}/{}", self.credentials.username, list_type);
        self.browser.navigate(&url)?;
        ensure_session(self.browser)?;
        let hrefs = self.browser.find_attributes(
            &Locator::css(format!("div#content a[href*='/{list_type}.php?id=']")),
            "href",
        )?;
        let mut found: Vec<u64> = Vec::new();
        for id in hrefs.iter().filter_map(|href| query_id(href, "id")) {
            if !found.contains(&id) {
                found.push(id);
            }
        }
        Ok(found)
    }

    fn authenticate(&mut self) -> SyncResult<()> {
        login(self.browser, self.credentials)
    }

    fn reauthenticate(&mut self) -> SyncResult<()> {
        self.browser.mark_logged_in(false);
        login(self.browser, self.credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ShardedStore;
    use crate::transport::LOGIN_PAGE;
    use tempfile::TempDir;

    /// A site whose history pages only render once the login form was sent
    #[derive(Default)]
    struct SiteBrowser {
        url: String,
        session_cookie: bool,
        marker: bool,
        events: Vec<String>,
    }

    impl Browser for SiteBrowser {
        fn navigate(&mut self, url: &str) -> SyncResult<()> {
            self.events.push(format!("navigate {url}"));
            self.url = url.to_string();
            Ok(())
        }

        fn current_url(&mut self) -> SyncResult<String> {
            Ok(self.url.clone())
        }

        fn find_texts(&mut self, locator: &Locator) -> SyncResult<Vec<String>> {
            if !self.session_cookie {
                return Ok(vec![]);
            }
            let value = locator.value();
            let texts = if value == "a.header-profile-link" {
                vec!["someone".to_string()]
            } else if value == "#epdetails" || value.contains("contains(text(), 'Details')") {
                vec!["Cowboy Bebop Episode Details".to_string()]
            } else if value.contains("eprow") {
                vec!["Ep 1, watched on 01/01/2021 at 10:00".to_string()]
            } else {
                vec![]
            };
            Ok(texts)
        }

        fn find_attributes(&mut self, _locator: &Locator, _name: &str) -> SyncResult<Vec<String>> {
            Ok(vec![])
        }

        fn find_html(&mut self, _locator: &Locator) -> SyncResult<Vec<String>> {
            Ok(vec![])
        }

        fn submit_form(&mut self, _fields: &[(Locator, &str)], _submit: &Locator) -> SyncResult<()> {
            self.events.push("submit".to_string());
            self.session_cookie = true;
            Ok(())
        }

        fn is_logged_in(&self) -> bool {
            self.marker
        }

        fn mark_logged_in(&mut self, logged_in: bool) {
            self.marker = logged_in;
        }
    }

    #[test]
    fn test_fresh_browser_logs_in_before_first_history_page() {
        let temp = TempDir::new().unwrap();
        let mut store: ShardedStore<HistoryRecord> = ShardedStore::open(temp.path().join("history")).unwrap();
        let creds = Credentials {
            username: "someone".into(),
            password: "hunter2".into(),
        };
        let mut browser = SiteBrowser::default();

        let report = {
            let mut source = BrowserHistorySource::new(&mut browser, &creds);
            HistorySync::new(ListType::Anime, &mut source, &mut store, 5)
                .run(HistoryCandidates::List(vec![1]), None)
                .unwrap()
        };

        assert_eq!(browser.events[0], format!("navigate {LOGIN_PAGE}"));
        assert_eq!(browser.events[1], "submit");
        assert!(browser.events[2].contains("detailedaid=1&"));
        assert!(report.skipped.is_empty());
        assert_eq!(store.load(1).unwrap().unwrap().title, "Cowboy Bebop");
    }

    fn local_ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        let naive = NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap().timestamp()
    }

    #[test]
    fn test_parse_episode_row() {
        let event = parse_history_row(ListType::Anime, "Ep 12, watched on 04/20/2021 at 18:02 Remove").unwrap();
        assert_eq!(event, HistoryEvent(12, local_ts(2021, 4, 20, 18, 2)));
    }

    #[test]
    fn test_parse_chapter_row() {
        let event = parse_history_row(ListType::Manga, "Chapter 3, read on 01/02/2020 at 09:30").unwrap();
        assert_eq!(event.number(), 3);
        assert!(parse_history_row(ListType::Anime, "Chapter 3, read on 01/02/2020 at 09:30").is_none());
        assert!(parse_history_row(ListType::Anime, "Ep 1, watched on 13/45/2020 at 09:30").is_none());
    }

    #[test]
    fn test_parse_page_title_and_order() {
        let headers = vec!["Cowboy Bebop Episode Details".to_string()];
        let rows = vec![
            "Ep 1, watched on 01/01/2021 at 10:00".to_string(),
            "Ep 2, watched on 01/03/2021 at 10:00".to_string(),
        ];
        let record = parse_history_page(ListType::Anime, 1, &headers, &rows).unwrap();
        assert_eq!(record.title, "Cowboy Bebop");
        assert_eq!(record.episodes[0].number(), 2);
        assert_eq!(record.episodes[1].number(), 1);
    }

    #[test]
    fn test_parse_page_errors_are_item_local() {
        let err = parse_history_page(ListType::Anime, 7, &[], &[]).unwrap_err();
        assert!(err.is_item_local());

        let headers = vec!["X Episode Details".to_string()];
        let err = parse_history_page(ListType::Anime, 7, &headers, &["garbage".to_string()]).unwrap_err();
        assert!(err.is_item_local());
        assert!(err.to_string().contains("garbage"));
    }

    #[test]
    fn test_history_url() {
        assert!(history_url(ListType::Manga, 2).contains("detailedmid=2&"));
        assert!(history_url(ListType::Anime, 5).contains("detailedaid=5&"));
    }
}

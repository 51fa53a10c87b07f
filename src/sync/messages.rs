//! Private message threads, scraped through a logged-in browser.
//!
//! Inbox and sent pages are walked together, newest first. Each message id
//! is resolved to the thread it belongs to; a thread is fetched at most once
//! per run no matter how many of its messages show up.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::collections::{HashMap, HashSet};

use super::{is_auth_expired, query_id, site_url, skip_item_local, SyncReport, REAUTH_ATTEMPTS};
use crate::credentials::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::limiter::UnchangedRunLimiter;
use crate::list_type::ResourceKind;
use crate::records::{Message, MessageThread};
use crate::retry::with_reauth;
use crate::store::EntryStore;
use crate::transport::{ensure_session, login, Browser, Locator};

/// Messages per inbox/sent page
const MESSAGES_PER_PAGE: usize = 20;

pub trait MessageSource {
    /// Message ids on one page (1-based) of the inbox, or of sent messages
    fn message_ids_for_page(&mut self, page: usize, sent: bool) -> SyncResult<Vec<u64>>;

    /// The thread a message belongs to
    fn resolve_thread(&mut self, message_id: u64, sent: bool) -> SyncResult<u64>;

    /// Every message in a thread
    fn fetch_thread(&mut self, thread_id: u64) -> SyncResult<MessageThread>;

    /// Log in, unless the session already is
    fn authenticate(&mut self) -> SyncResult<()>;

    fn reauthenticate(&mut self) -> SyncResult<()>;
}

/// `a1 b1 a2 b2 ...`, continuing with whichever list is longer
pub fn interleave_longest<T>(a: Vec<T>, b: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    loop {
        match (a.next(), b.next()) {
            (None, None) => break,
            (x, y) => out.extend(x.into_iter().chain(y)),
        }
    }
    out
}

pub struct MessageSync<'a, S: MessageSource + ?Sized> {
    source: &'a mut S,
    store: &'a mut dyn EntryStore<MessageThread>,
    till_same_limit: usize,
    msg_to_thread: HashMap<u64, u64>,
    seen_threads: HashSet<u64>,
    report: SyncReport,
}

impl<'a, S: MessageSource + ?Sized> MessageSync<'a, S> {
    pub fn new(source: &'a mut S, store: &'a mut dyn EntryStore<MessageThread>, till_same_limit: usize) -> Self {
        Self {
            source,
            store,
            till_same_limit,
            msg_to_thread: HashMap::new(),
            seen_threads: HashSet::new(),
            report: SyncReport::new("messages"),
        }
    }

    /// Walk message pages from `start_page` until both feeds run dry or
    /// `till_same_limit` threads in a row come back unchanged.
    pub fn run(mut self, start_page: usize) -> SyncResult<SyncReport> {
        self.source.authenticate()?;
        let mut limiter = UnchangedRunLimiter::new(self.till_same_limit);
        let mut page = start_page.max(1);

        'pages: while limiter.should_continue() {
            let inbox = self.page_ids(page, false)?;
            let sent = self.page_ids(page, true)?;
            if inbox.is_empty() && sent.is_empty() {
                break;
            }
            let tagged = interleave_longest(
                inbox.into_iter().map(|id| (false, id)).collect(),
                sent.into_iter().map(|id| (true, id)).collect(),
            );
            for (sent, message_id) in tagged {
                if !limiter.should_continue() {
                    break 'pages;
                }
                self.update_message(message_id, sent, &mut limiter)?;
                log::info!("Requesting {} more threads...", limiter.remaining());
            }
            page += 1;
        }

        self.store.flush()?;
        Ok(self.report)
    }

    /// Thread ids resolved so far, by message id
    pub fn resolved(&self) -> &HashMap<u64, u64> {
        &self.msg_to_thread
    }

    fn page_ids(&mut self, page: usize, sent: bool) -> SyncResult<Vec<u64>> {
        with_reauth(
            &mut *self.source,
            REAUTH_ATTEMPTS,
            is_auth_expired,
            |s| s.message_ids_for_page(page, sent),
            |s| s.reauthenticate(),
        )
    }

    fn update_message(&mut self, message_id: u64, sent: bool, limiter: &mut UnchangedRunLimiter) -> SyncResult<()> {
        let resolved = with_reauth(
            &mut *self.source,
            REAUTH_ATTEMPTS,
            is_auth_expired,
            |s| s.resolve_thread(message_id, sent),
            |s| s.reauthenticate(),
        );
        let Some(thread_id) = skip_item_local(&mut self.report, resolved)? else {
            return Ok(());
        };
        log::info!("msg {} -> thread {}", message_id, thread_id);

        if self.seen_threads.contains(&thread_id) {
            log::debug!("thread {} has already been requested, skipping...", thread_id);
            self.msg_to_thread.insert(message_id, thread_id);
            return Ok(());
        }

        let fetched = with_reauth(
            &mut *self.source,
            REAUTH_ATTEMPTS,
            is_auth_expired,
            |s| s.fetch_thread(thread_id),
            |s| s.reauthenticate(),
        );
        let Some(mut thread) = skip_item_local(&mut self.report, fetched)? else {
            return Ok(());
        };
        if let Some(previous) = self.store.load(thread_id)? {
            thread.keep_dates_from(&previous);
        }
        let changed = self.store.save(thread_id, &thread)?;
        self.report.record_fetch(changed);
        if changed {
            log::debug!("msg id {}, thread {} had new data, resetting...", message_id, thread_id);
        } else {
            log::debug!("msg id {}, thread {} matched old data, decrementing...", message_id, thread_id);
        }
        limiter.observe(changed);

        self.seen_threads.insert(thread_id);
        self.msg_to_thread.insert(message_id, thread_id);
        Ok(())
    }
}

fn local_timestamp(naive: NaiveDateTime) -> Option<i64> {
    Local.from_local_datetime(&naive).earliest().map(|dt| dt.timestamp())
}

/// Parse the dates shown next to messages: `Apr 20, 2021 6:02 PM`,
/// `Apr 20, 6:02 PM` (this year), `Yesterday, 6:02 PM`, `5 minutes ago`.
pub fn parse_message_date(text: &str, now: DateTime<Local>) -> Option<i64> {
    let s = text.trim();
    let lower = s.to_ascii_lowercase();
    if lower == "now" || lower == "just now" {
        return Some(now.timestamp());
    }
    if let Some(rest) = lower.strip_suffix(" ago") {
        let mut parts = rest.split_whitespace();
        let n: i64 = match parts.next()? {
            "a" | "an" => 1,
            n => n.parse().ok()?,
        };
        let unit_secs = match parts.next()?.trim_end_matches('s') {
            "second" => 1,
            "minute" => 60,
            "hour" => 3600,
            "day" => 86_400,
            "week" => 604_800,
            _ => return None,
        };
        return Some(now.timestamp() - n * unit_secs);
    }
    for (prefix, days_back) in [("today,", 0), ("yesterday,", 1)] {
        if lower.starts_with(prefix) {
            let time = NaiveTime::parse_from_str(s[prefix.len()..].trim(), "%I:%M %p").ok()?;
            let mut date: NaiveDate = now.date_naive();
            for _ in 0..days_back {
                date = date.pred_opt()?;
            }
            return local_timestamp(date.and_time(time));
        }
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%b %d, %Y %I:%M %p") {
        return local_timestamp(naive);
    }
    let (day, time) = s.split_once(", ")?;
    let with_year = format!("{day}, {} {time}", now.format("%Y"));
    NaiveDateTime::parse_from_str(&with_year, "%b %d, %Y %I:%M %p")
        .ok()
        .and_then(local_timestamp)
}

/// Message pages read through a logged-in browser
pub struct BrowserMessageSource<'a> {
    browser: &'a mut dyn Browser,
    credentials: &'a Credentials,
    thread_urls: HashMap<u64, String>,
}

impl<'a> BrowserMessageSource<'a> {
    pub fn new(browser: &'a mut dyn Browser, credentials: &'a Credentials) -> Self {
        Self {
            browser,
            credentials,
            thread_urls: HashMap::new(),
        }
    }
}

impl MessageSource for BrowserMessageSource<'_> {
    fn message_ids_for_page(&mut self, page: usize, sent: bool) -> SyncResult<Vec<u64>> {
        log::info!("Downloading page {} of your {}messages", page, if sent { "sent " } else { "" });
        let offset = page.saturating_sub(1) * MESSAGES_PER_PAGE;
        let url = format!(
            "https://myanimelist.net/mymessages.php?go={}&show={}",
            if sent { "sent" } else { "" },
            offset
        );
        self.browser.navigate(&url)?;
        ensure_session(self.browser)?;
        let hrefs = self.browser.find_attributes(&Locator::css("a.subject-link"), "href")?;
        Ok(hrefs.iter().filter_map(|h| query_id(h, "id")).collect())
    }

    fn resolve_thread(&mut self, message_id: u64, sent: bool) -> SyncResult<u64> {
        log::debug!("Resolving message ID {} to thread...", message_id);
        let url = format!(
            "https://myanimelist.net/mymessages.php?go=read&id={}{}",
            message_id,
            if sent { "&f=1" } else { "" }
        );
        self.browser.navigate(&url)?;
        ensure_session(self.browser)?;
        let link = self
            .browser
            .find_attributes(&Locator::PartialLinkText("View Message History".into()), "href")?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SyncError::parse(ResourceKind::MessageThread, None, format!("no message history link for message {message_id}"))
            })?;
        let thread_url = site_url(&link);
        let thread_id = query_id(&thread_url, "threadid").ok_or_else(|| {
            SyncError::parse(ResourceKind::MessageThread, None, format!("no threadid in {thread_url}"))
        })?;
        log::debug!("Thread URL is {}", thread_url);
        self.thread_urls.insert(thread_id, thread_url);
        Ok(thread_id)
    }

    fn fetch_thread(&mut self, thread_id: u64) -> SyncResult<MessageThread> {
        let url = self
            .thread_urls
            .get(&thread_id)
            .cloned()
            .unwrap_or_else(|| format!("https://myanimelist.net/mymessages.php?go=read&threadid={thread_id}"));
        if self.browser.current_url()? != url {
            self.browser.navigate(&url)?;
            ensure_session(self.browser)?;
        }
        let parse_err = |message: &str| SyncError::parse(ResourceKind::MessageThread, Some(thread_id), message);

        let subject = self
            .browser
            .find_texts(&Locator::css("#content .dialog-text .mb4"))?
            .pop()
            .ok_or_else(|| parse_err("no subject"))?;
        let rows = "#content table.pmessage-message-history tr";
        let dates = self.browser.find_texts(&Locator::css(format!("{rows} td.date")))?;
        let names = self.browser.find_texts(&Locator::css(format!("{rows} td.name")))?;
        let contents = self.browser.find_html(&Locator::css(format!("{rows} td.subject")))?;
        if dates.len() != names.len() || dates.len() != contents.len() {
            return Err(parse_err("message rows are missing a date, name or body cell"));
        }

        let now = Local::now();
        let messages = dates
            .iter()
            .zip(names)
            .zip(contents)
            .map(|((date, name), content)| Message {
                username: name.trim().to_string(),
                dt: parse_message_date(date, now),
                content: content.trim().to_string(),
            })
            .collect();
        Ok(MessageThread {
            subject: MessageThread::clean_subject(&subject),
            messages,
        })
    }

    fn authenticate(&mut self) -> SyncResult<()> {
        login(self.browser, self.credentials)
    }

    fn reauthenticate(&mut self) -> SyncResult<()> {
        self.browser.mark_logged_in(false);
        login(self.browser, self.credentials)
    }
}

//! Forum topics the user created or posted in, through the REST API.
//!
//! The index is rebuilt on every run. A topic's detail is only re-fetched
//! when the index's `last_post_created_at` differs from the one stored with
//! the detail.

use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use super::{skip_item_local, SyncReport};
use crate::error::{SyncError, SyncResult};
use crate::limiter::UnchangedRunLimiter;
use crate::list_type::ResourceKind;
use crate::records::{ForumIndexEntry, ForumTopic};
use crate::store::{write_json_atomic, EntryStore};
use crate::transport::{api_pages, JsonApi};

/// Topics created by the user, then topics the user posted in
pub const FORUM_INDEX_FEEDS: [&str; 2] = [
    "https://api.myanimelist.net/v2/forum/topics?user_name={username}&limit=100",
    "https://api.myanimelist.net/v2/forum/topics?topic_user_name={username}&limit=100",
];

fn topic_url(topic_id: u64) -> String {
    format!("https://api.myanimelist.net/v2/forum/topic/{topic_id}?limit=100")
}

pub struct ForumSync<'a, A: JsonApi + ?Sized> {
    api: &'a mut A,
    store: &'a mut dyn EntryStore<ForumTopic>,
    index_path: PathBuf,
    till_same_limit: Option<usize>,
}

impl<'a, A: JsonApi + ?Sized> ForumSync<'a, A> {
    pub fn new(api: &'a mut A, store: &'a mut dyn EntryStore<ForumTopic>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            api,
            store,
            index_path: index_path.into(),
            till_same_limit: None,
        }
    }

    /// Stop after this many consecutive unchanged topics instead of walking
    /// the whole index
    pub fn with_till_same_limit(mut self, limit: Option<usize>) -> Self {
        self.till_same_limit = limit;
        self
    }

    /// Rebuild the index from both feeds and save it. A topic listed by both
    /// feeds is kept once.
    pub fn update_index(&mut self, username: &str) -> SyncResult<Vec<ForumIndexEntry>> {
        let mut index: Vec<ForumIndexEntry> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();
        for feed in FORUM_INDEX_FEEDS {
            let url = feed.replace("{username}", username);
            for page in api_pages(&mut *self.api, &url) {
                let items = match page? {
                    Value::Array(items) => items,
                    _ => {
                        return Err(SyncError::parse(
                            ResourceKind::ForumTopic,
                            None,
                            format!("{url}: 'data' is not an array"),
                        ))
                    }
                };
                for item in items {
                    let entry: ForumIndexEntry = serde_json::from_value(item)
                        .map_err(|e| SyncError::parse(ResourceKind::ForumTopic, None, e.to_string()))?;
                    if seen.insert(entry.id) {
                        index.push(entry);
                    }
                }
            }
        }
        log::info!("Saving forum index ({} topics) to {}", index.len(), self.index_path.display());
        write_json_atomic(&self.index_path, &index)?;
        Ok(index)
    }

    /// Whether the stored detail is missing or was fetched at a different
    /// last-post stamp than the index now shows
    pub fn topic_has_changed(&self, entry: &ForumIndexEntry) -> bool {
        match self.store.load(entry.id) {
            Ok(Some(stored)) => stored.last_post_created_at != entry.last_post_created_at,
            Ok(None) => true,
            Err(e) => {
                log::warn!("Could not read stored forum topic {}: {}", entry.id, e);
                true
            }
        }
    }

    /// Fetch every page of a topic, merging their posts into the first
    pub fn fetch_topic(&mut self, entry: &ForumIndexEntry) -> SyncResult<ForumTopic> {
        let mut topic: Option<ForumTopic> = None;
        for page in api_pages(&mut *self.api, &topic_url(entry.id)) {
            let page = page.map_err(|e| e.for_item(ResourceKind::ForumTopic, entry.id))?;
            let page: ForumTopic = serde_json::from_value(page)
                .map_err(|e| SyncError::parse(ResourceKind::ForumTopic, Some(entry.id), e.to_string()))?;
            match topic.as_mut() {
                Some(first) => first.posts.extend(page.posts),
                None => topic = Some(page),
            }
        }
        let mut topic = topic.ok_or_else(|| {
            SyncError::parse(ResourceKind::ForumTopic, Some(entry.id), "no data returned")
        })?;
        topic.last_post_created_at = entry.last_post_created_at.clone();
        Ok(topic)
    }

    /// Rebuild the index, then refresh every topic whose last post changed
    pub fn run(mut self, username: &str) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new("forum");
        let index = self.update_index(username)?;
        let mut limiter = self.till_same_limit.map(UnchangedRunLimiter::new);

        for entry in &index {
            if limiter.as_ref().is_some_and(|l| !l.should_continue()) {
                log::info!("Hit {} unchanged forum topics in a row, stopping", limiter.as_ref().map_or(0, |l| l.threshold()));
                break;
            }
            if !self.topic_has_changed(entry) {
                log::debug!("Forum topic {} has not changed, skipping", entry.id);
                report.unchanged += 1;
                if let Some(l) = limiter.as_mut() {
                    l.observe(false);
                }
                continue;
            }
            log::info!("Requesting forum topic {} ({})", entry.id, entry.title);
            let outcome = self.fetch_topic(entry);
            if let Some(topic) = skip_item_local(&mut report, outcome)? {
                let changed = self.store.save(entry.id, &topic)?;
                report.record_fetch(changed);
                if let Some(l) = limiter.as_mut() {
                    l.observe(true);
                }
            }
        }
        self.store.flush()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feeds_cover_created_and_commented() {
        let urls: Vec<String> = FORUM_INDEX_FEEDS.iter().map(|f| f.replace("{username}", "someone")).collect();
        assert!(urls[0].contains("user_name=someone"));
        assert!(urls[1].contains("topic_user_name=someone"));
        assert_eq!(topic_url(9), "https://api.myanimelist.net/v2/forum/topic/9?limit=100");
    }
}

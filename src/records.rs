use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::list_type::ListType;

/// Anything the entry store can persist and compare
pub trait Record: Serialize + DeserializeOwned + PartialEq + Clone {}

impl<T> Record for T where T: Serialize + DeserializeOwned + PartialEq + Clone {}

/// One watched episode / read chapter: `(number, unix timestamp)`
///
/// Serialized as a two element array to match the files on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent(pub u32, pub i64);

impl HistoryEvent {
    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn at(&self) -> i64 {
        self.1
    }
}

/// Episode or chapter history for one list entry
///
/// An entry can list the same episode more than once (rewatches), so this is
/// a list rather than a map. Sorted most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub title: String,
    #[serde(default)]
    pub episodes: Vec<HistoryEvent>,
}

impl HistoryRecord {
    pub fn new(title: impl Into<String>, mut episodes: Vec<HistoryEvent>) -> Self {
        episodes.sort_by(|a, b| b.at().cmp(&a.at()));
        Self {
            title: title.into(),
            episodes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// A row from the list endpoints; only the id field is interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListEntry(pub Map<String, Value>);

impl ListEntry {
    pub fn id(&self, list_type: ListType) -> Option<u64> {
        self.0.get(list_type.id_field()).and_then(Value::as_u64)
    }

    pub fn title(&self, list_type: ListType) -> Option<&str> {
        let key = match list_type {
            ListType::Anime => "anime_title",
            ListType::Manga => "manga_title",
        };
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Ids of every row in a list, in list order. Rows without an id are skipped.
pub fn list_ids(entries: &[ListEntry], list_type: ListType) -> Vec<u64> {
    entries.iter().filter_map(|e| e.id(list_type)).collect()
}

/// One forum topic from the index feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumIndexEntry {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_post_created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumUser {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: String,
    pub created_by: ForumUser,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full detail of a forum topic, posts merged across all pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumTopic {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub posts: Vec<ForumPost>,
    /// Copied from the index when the topic was fetched; used to decide
    /// whether the topic needs fetching again.
    #[serde(default)]
    pub last_post_created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub username: String,
    /// Unix timestamp, if the date on the page could be parsed
    pub dt: Option<i64>,
    /// Raw HTML of the message body
    pub content: String,
}

/// A private message thread (both directions of the conversation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageThread {
    pub subject: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl MessageThread {
    /// Strip surrounding whitespace and a leading `re:` from a subject line
    pub fn clean_subject(subject: &str) -> String {
        let s = subject.trim();
        let s = s.strip_prefix("re:").unwrap_or(s);
        s.trim().to_string()
    }

    /// Keep the timestamps already stored for messages seen before.
    ///
    /// Recent messages are dated relative to now ("5 minutes ago"), so the
    /// same message parses to a different `dt` on every run. A message with
    /// the same author and body as a stored one keeps the stored `dt`.
    pub fn keep_dates_from(&mut self, previous: &MessageThread) {
        let mut used = vec![false; previous.messages.len()];
        for message in &mut self.messages {
            let found = previous.messages.iter().enumerate().find(|(i, old)| {
                !used[*i] && old.username == message.username && old.content == message.content
            });
            if let Some((i, old)) = found {
                used[i] = true;
                if old.dt.is_some() {
                    message.dt = old.dt;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_event_serializes_as_pair() {
        let record = HistoryRecord::new("Monster", vec![HistoryEvent(1, 100), HistoryEvent(2, 200)]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"title":"Monster","episodes":[[2,200],[1,100]]}"#);

        let back: HistoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_list_entry_id() {
        let entry: ListEntry =
            serde_json::from_str(r#"{"anime_id": 1, "anime_title": "Cowboy Bebop", "status": 2}"#).unwrap();
        assert_eq!(entry.id(ListType::Anime), Some(1));
        assert_eq!(entry.id(ListType::Manga), None);
        assert_eq!(entry.title(ListType::Anime), Some("Cowboy Bebop"));
    }

    #[test]
    fn test_forum_topic_keeps_unknown_fields() {
        let json = r#"{
            "title": "Hello",
            "poll": null,
            "posts": [{"id": 5, "body": "hi", "created_at": "2021-01-01T00:00:00+00:00",
                       "created_by": {"id": 1, "name": "user", "forum_avator": ""}, "number": 1}]
        }"#;
        let topic: ForumTopic = serde_json::from_str(json).unwrap();
        assert_eq!(topic.posts.len(), 1);
        assert!(topic.extra.contains_key("poll"));
        assert!(topic.posts[0].extra.contains_key("number"));
        assert!(topic.last_post_created_at.is_none());
    }

    #[test]
    fn test_keep_dates_from_previous_thread() {
        let msg = |name: &str, dt: i64, body: &str| Message {
            username: name.into(),
            dt: Some(dt),
            content: body.into(),
        };
        let previous = MessageThread {
            subject: "hi".into(),
            messages: vec![msg("a", 100, "hello"), msg("b", 200, "yo")],
        };
        let mut fresh = MessageThread {
            subject: "hi".into(),
            messages: vec![msg("a", 160, "hello"), msg("b", 260, "yo"), msg("a", 300, "new")],
        };
        fresh.keep_dates_from(&previous);
        let dates: Vec<Option<i64>> = fresh.messages.iter().map(|m| m.dt).collect();
        assert_eq!(dates, vec![Some(100), Some(200), Some(300)]);
    }

    #[test]
    fn test_clean_subject() {
        assert_eq!(MessageThread::clean_subject("  re: hello there "), "hello there");
        assert_eq!(MessageThread::clean_subject("recommendations"), "recommendations");
    }
}

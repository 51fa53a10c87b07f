//! Read back what the sync engine stored, for the `parse` subcommands and
//! for combining snapshots during recovery.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{SyncError, SyncResult};
use crate::list_type::ListType;
use crate::localdir::LocalDir;
use crate::records::{ForumTopic, HistoryEvent, HistoryRecord, ListEntry, MessageThread};
use crate::store::{read_json, EntryStore, MergedStore, ShardedStore};

/// History of one entry that has at least one episode/chapter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub id: u64,
    pub list_type: ListType,
    pub title: String,
    pub episodes: Vec<HistoryEvent>,
}

impl HistoryItem {
    pub fn url(&self) -> String {
        format!("https://myanimelist.net/{}/{}", self.list_type, self.id)
    }
}

/// Every stored history record, from the merged file if there is one,
/// otherwise from the sharded directory. Missing data is an empty map.
pub fn load_history_records(localdir: &LocalDir, list_type: ListType) -> SyncResult<BTreeMap<u64, HistoryRecord>> {
    let merged_path = localdir.merged_history_path(list_type);
    let sharded_dir = localdir.history_dir(list_type);
    let store: Box<dyn EntryStore<HistoryRecord>> = if merged_path.exists() {
        Box::new(MergedStore::<HistoryRecord>::open(merged_path, usize::MAX)?)
    } else if sharded_dir.is_dir() {
        Box::new(ShardedStore::<HistoryRecord>::open(sharded_dir)?)
    } else {
        return Ok(BTreeMap::new());
    };

    let mut records = BTreeMap::new();
    for id in store.ids()? {
        if let Some(record) = store.load(id)? {
            records.insert(id, record);
        }
    }
    Ok(records)
}

/// History items with at least one episode/chapter, ordered by id
pub fn iter_history(localdir: &LocalDir, list_type: ListType) -> SyncResult<Vec<HistoryItem>> {
    Ok(load_history_records(localdir, list_type)?
        .into_iter()
        .filter(|(_, record)| !record.is_empty())
        .map(|(id, record)| HistoryItem {
            id,
            list_type,
            title: record.title,
            episodes: record.episodes,
        })
        .collect())
}

/// A forum post written by the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPost {
    pub topic_id: u64,
    pub title: String,
    pub comment_id: u64,
    pub username: String,
    pub url: String,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub body: String,
}

/// Posts by `username` (case-insensitive) across every stored topic
pub fn iter_forum_posts(localdir: &LocalDir, username: &str) -> SyncResult<Vec<UserPost>> {
    let forum_dir = localdir.forum_dir();
    if !forum_dir.is_dir() {
        return Ok(Vec::new());
    }
    let store: ShardedStore<ForumTopic> = ShardedStore::open(forum_dir)?;
    let wanted = username.to_lowercase();
    let mut posts = Vec::new();
    for topic_id in store.ids()? {
        let Some(topic) = store.load(topic_id)? else {
            continue;
        };
        for post in &topic.posts {
            if post.created_by.name.to_lowercase() != wanted {
                continue;
            }
            posts.push(UserPost {
                topic_id,
                title: topic.title.clone(),
                comment_id: post.id,
                username: post.created_by.name.clone(),
                url: format!("https://myanimelist.net/forum/?topicid={}&show=0#msg{}", topic_id, post.id),
                created_at: DateTime::parse_from_rfc3339(&post.created_at).ok(),
                body: post.body.clone(),
            });
        }
    }
    Ok(posts)
}

/// Every stored message thread, by thread id
pub fn iter_threads(localdir: &LocalDir) -> SyncResult<Vec<(u64, MessageThread)>> {
    let messages_dir = localdir.messages_dir();
    if !messages_dir.is_dir() {
        return Ok(Vec::new());
    }
    let store: ShardedStore<MessageThread> = ShardedStore::open(messages_dir)?;
    let mut threads = Vec::new();
    for id in store.ids()? {
        if let Some(thread) = store.load(id)? {
            threads.push((id, thread));
        }
    }
    Ok(threads)
}

/// `anime` unless the file name says otherwise
pub fn infer_list_type(path: &Path) -> ListType {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    if name.contains("anime") {
        ListType::Anime
    } else {
        ListType::Manga
    }
}

fn read_required<T: serde::de::DeserializeOwned>(path: &Path) -> SyncResult<T> {
    read_json(path)?.ok_or_else(|| SyncError::Precondition(format!("{} does not exist", path.display())))
}

/// Rows of a saved `load.json` list that carry an id for `list_type`
pub fn parse_list_file(path: &Path, list_type: ListType) -> SyncResult<Vec<ListEntry>> {
    let rows: Vec<ListEntry> = read_required(path)?;
    Ok(rows.into_iter().filter(|row| row.id(list_type).is_some()).collect())
}

/// One entry of a saved API list, with the user's list status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiListEntry {
    #[serde(default = "default_entry_type", skip_deserializing)]
    pub entry_type: ListType,
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename(deserialize = "my_list_status"))]
    pub list_status: Option<Value>,
}

fn default_entry_type() -> ListType {
    ListType::Anime
}

pub fn parse_api_list_file(path: &Path, list_type: ListType) -> SyncResult<Vec<ApiListEntry>> {
    let mut entries: Vec<ApiListEntry> = read_required(path)?;
    for entry in &mut entries {
        entry.entry_type = list_type;
    }
    Ok(entries)
}

/// An XML list export: the `myinfo` block and one field map per entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmlExport {
    pub list_type: ListType,
    pub info: BTreeMap<String, Value>,
    pub entries: Vec<BTreeMap<String, Value>>,
}

/// Numbers stay numbers, everything else is text with CDATA unwrapped
fn xml_value(raw: &str) -> Value {
    let text = raw.trim();
    let text = text
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text);
    match text.parse::<u64>() {
        Ok(n) if text.chars().all(|c| c.is_ascii_digit()) => Value::from(n),
        _ => Value::from(text),
    }
}

fn xml_fields(fields: &Regex, block: &str) -> BTreeMap<String, Value> {
    fields
        .captures_iter(block)
        .filter(|c| c[1] == c[3])
        .map(|c| (c[1].to_string(), xml_value(&c[2])))
        .collect()
}

/// Parse an exported `animelist.xml` / `mangalist.xml`. The list type comes
/// from `user_export_type` (1 is anime).
pub fn parse_xml_export(path: &Path) -> SyncResult<XmlExport> {
    let content = fs::read_to_string(path)?;
    let regex = |pattern: &str| Regex::new(pattern).map_err(|e| SyncError::Precondition(e.to_string()));
    let fields = regex(r"(?s)<(\w+)>(.*?)</(\w+)>")?;

    let info_block = regex(r"(?s)<myinfo>(.*?)</myinfo>")?
        .captures(&content)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let info = xml_fields(&fields, &info_block);
    let list_type = match info.get("user_export_type").and_then(Value::as_u64) {
        Some(1) => ListType::Anime,
        _ => ListType::Manga,
    };

    let entry_pattern = regex(format!(r"(?s)<{list_type}>(.*?)</{list_type}>").as_str())?;
    let entries = entry_pattern
        .captures_iter(&content)
        .map(|c| xml_fields(&fields, &c[1]))
        .collect();
    Ok(XmlExport {
        list_type,
        info,
        entries,
    })
}

/// A row of the saved friends list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendItem {
    pub username: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub friends_since: Option<String>,
    pub last_online: Option<String>,
}

/// Friends from `friends.json`; empty if it was never written. Rows may
/// nest the user under `user` or keep the fields at the top level.
pub fn iter_friends(localdir: &LocalDir) -> SyncResult<Vec<FriendItem>> {
    let Some(rows): Option<Vec<Value>> = read_json(&localdir.friends_path())? else {
        log::debug!("{} doesn't exist", localdir.friends_path().display());
        return Ok(Vec::new());
    };
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
    Ok(rows
        .iter()
        .filter_map(|row| {
            let user = row.get("user").unwrap_or(row);
            Some(FriendItem {
                username: text(user.get("username"))?,
                url: text(user.get("url")),
                image_url: text(user.pointer("/images/jpg/image_url").or_else(|| user.get("image_url"))),
                friends_since: text(row.get("friends_since")),
                last_online: text(row.get("last_online")),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_json_atomic;
    use serde_json::json;
    use tempfile::TempDir;

    fn localdir(temp: &TempDir) -> LocalDir {
        LocalDir::new(temp.path(), temp.path().join("cfg"), "someone")
    }

    #[test]
    fn test_history_reads_either_layout() {
        let temp = TempDir::new().unwrap();
        let dir = localdir(&temp);
        assert!(iter_history(&dir, ListType::Anime).unwrap().is_empty());

        let mut sharded = ShardedStore::open(dir.history_dir(ListType::Anime)).unwrap();
        sharded.save(1, &HistoryRecord::new("A", vec![HistoryEvent(1, 10)])).unwrap();
        sharded.save(2, &HistoryRecord::new("Empty", vec![])).unwrap();
        let items = iter_history(&dir, ListType::Anime).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url(), "https://myanimelist.net/anime/1");
        assert_eq!(load_history_records(&dir, ListType::Anime).unwrap().len(), 2);

        {
            let mut merged = MergedStore::open(dir.merged_history_path(ListType::Anime), 10).unwrap();
            merged.save(5, &HistoryRecord::new("B", vec![HistoryEvent(3, 30)])).unwrap();
        }
        let items = iter_history(&dir, ListType::Anime).unwrap();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_forum_posts_by_user() {
        let temp = TempDir::new().unwrap();
        let dir = localdir(&temp);
        write_json_atomic(&dir.forum_index_path(), &json!([{"id": 7}])).unwrap();
        write_json_atomic(
            &dir.forum_dir().join("7.json"),
            &json!({
                "title": "Hello",
                "posts": [
                    {"id": 1, "body": "mine", "created_at": "2021-01-01T00:00:00+00:00",
                     "created_by": {"id": 1, "name": "SomeOne"}},
                    {"id": 2, "body": "theirs", "created_at": "2021-01-02T00:00:00+00:00",
                     "created_by": {"id": 2, "name": "other"}}
                ],
                "last_post_created_at": "2021-01-02T00:00:00+00:00"
            }),
        )
        .unwrap();

        let posts = iter_forum_posts(&dir, "someone").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].body, "mine");
        assert_eq!(posts[0].url, "https://myanimelist.net/forum/?topicid=7&show=0#msg1");
        assert!(posts[0].created_at.is_some());
    }

    #[test]
    fn test_infer_list_type() {
        assert_eq!(infer_list_type(Path::new("/x/animelist.json")), ListType::Anime);
        assert_eq!(infer_list_type(Path::new("mangalist_api.json")), ListType::Manga);
    }

    #[test]
    fn test_list_and_api_list_files() {
        let temp = TempDir::new().unwrap();
        let list = temp.path().join("mangalist.json");
        write_json_atomic(&list, &json!([{"manga_id": 2, "status": 1}, {"status": 6}])).unwrap();
        let rows = parse_list_file(&list, ListType::Manga).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(ListType::Manga), Some(2));

        let api = temp.path().join("mangalist_api.json");
        write_json_atomic(
            &api,
            &json!([{"id": 2, "title": "Berserk", "my_list_status": {"status": "reading"}}]),
        )
        .unwrap();
        let entries = parse_api_list_file(&api, ListType::Manga).unwrap();
        assert_eq!(entries[0].entry_type, ListType::Manga);
        assert_eq!(entries[0].list_status.as_ref().unwrap()["status"], "reading");

        let err = parse_list_file(&temp.path().join("missing.json"), ListType::Anime).unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
    }

    #[test]
    fn test_xml_export() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("animelist.xml");
        fs::write(
            &path,
            "<?xml version=\"1.0\"?><myanimelist>\
             <myinfo><user_name>someone</user_name><user_export_type>1</user_export_type></myinfo>\
             <anime><series_animedb_id>1</series_animedb_id><series_title><![CDATA[Cowboy Bebop]]></series_title>\
             <my_status>Completed</my_status></anime>\
             <anime><series_animedb_id>30</series_animedb_id><series_title><![CDATA[Eva]]></series_title></anime>\
             </myanimelist>",
        )
        .unwrap();

        let export = parse_xml_export(&path).unwrap();
        assert_eq!(export.list_type, ListType::Anime);
        assert_eq!(export.info["user_name"], "someone");
        assert_eq!(export.entries.len(), 2);
        assert_eq!(export.entries[0]["series_animedb_id"], 1);
        assert_eq!(export.entries[0]["series_title"], "Cowboy Bebop");
        assert_eq!(export.entries[0]["my_status"], "Completed");
    }

    #[test]
    fn test_friends_either_shape() {
        let temp = TempDir::new().unwrap();
        let dir = localdir(&temp);
        assert!(iter_friends(&dir).unwrap().is_empty());

        write_json_atomic(
            &dir.friends_path(),
            &json!([
                {"username": "flat", "url": "https://myanimelist.net/profile/flat", "image_url": "a.jpg",
                 "friends_since": "2020-01-01T00:00:00+00:00"},
                {"user": {"username": "nested", "images": {"jpg": {"image_url": "b.jpg"}}},
                 "last_online": "2021-01-01T00:00:00+00:00"},
                {"no": "name"}
            ]),
        )
        .unwrap();
        let friends = iter_friends(&dir).unwrap();
        assert_eq!(friends.len(), 2);
        assert_eq!(friends[0].image_url.as_deref(), Some("a.jpg"));
        assert_eq!(friends[1].username, "nested");
        assert_eq!(friends[1].image_url.as_deref(), Some("b.jpg"));
    }
}

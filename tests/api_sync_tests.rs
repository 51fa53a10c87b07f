use malexport::error::{SyncError, SyncResult};
use malexport::list_type::ListType;
use malexport::records::{ForumTopic, ListEntry};
use malexport::store::{read_json, EntryStore, ShardedStore};
use malexport::sync::{friend_page_url, update_friends, update_list, ForumSync, LIST_PAGE_SIZE};
use malexport::transport::JsonApi;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

/// Canned responses by URL; unknown URLs fail like a dead server
#[derive(Default)]
struct FakeApi {
    responses: HashMap<String, Value>,
    requested: Vec<String>,
}

impl FakeApi {
    fn respond(&mut self, url: impl Into<String>, body: Value) {
        self.responses.insert(url.into(), body);
    }

    fn count(&self, url: &str) -> usize {
        self.requested.iter().filter(|u| u.as_str() == url).count()
    }
}

impl JsonApi for FakeApi {
    fn get_json(&mut self, url: &str) -> SyncResult<Value> {
        self.requested.push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::transient(url, "503"))
    }
}

fn list_url(offset: usize) -> String {
    format!("https://myanimelist.net/animelist/someone/load.json?status=7&order=5&offset={offset}")
}

fn rows(start: u64, n: usize) -> Value {
    Value::Array((start..start + n as u64).map(|id| json!({"anime_id": id, "status": 2})).collect())
}

#[test]
fn test_list_pages_until_short_page() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("animelist.json");
    let mut api = FakeApi::default();
    api.respond(list_url(0), rows(0, LIST_PAGE_SIZE));
    api.respond(list_url(LIST_PAGE_SIZE), rows(LIST_PAGE_SIZE as u64, 12));

    let report = update_list(&mut api, ListType::Anime, "someone", &path).unwrap();

    assert_eq!(api.requested.len(), 2);
    assert_eq!(report.fetched, LIST_PAGE_SIZE + 12);
    let saved: Vec<ListEntry> = read_json(&path).unwrap().unwrap();
    assert_eq!(saved.len(), LIST_PAGE_SIZE + 12);
}

#[test]
fn test_list_rerun_reports_unchanged() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("animelist.json");
    let mut api = FakeApi::default();
    api.respond(list_url(0), rows(1, 3));

    update_list(&mut api, ListType::Anime, "someone", &path).unwrap();
    let first = fs::read(&path).unwrap();
    let report = update_list(&mut api, ListType::Anime, "someone", &path).unwrap();

    assert_eq!(report.changed, 0);
    assert_eq!(report.unchanged, 3);
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn test_list_failure_keeps_previous_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("animelist.json");
    fs::write(&path, r#"[{"anime_id": 1}]"#).unwrap();
    let mut api = FakeApi::default();
    api.respond(list_url(0), rows(0, LIST_PAGE_SIZE));

    assert!(update_list(&mut api, ListType::Anime, "someone", &path).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), r#"[{"anime_id": 1}]"#);
}

#[test]
fn test_friends_empty_result_leaves_file_alone() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("friends.json");
    fs::write(&path, r#"[{"username": "old"}]"#).unwrap();
    let mut api = FakeApi::default();

    let report = update_friends(&mut api, "someone", &path).unwrap();

    assert_eq!(report.fetched, 0);
    assert_eq!(api.requested, vec![friend_page_url("someone", 1)]);
    assert_eq!(fs::read_to_string(&path).unwrap(), r#"[{"username": "old"}]"#);
}

#[test]
fn test_friends_replaced_when_found() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("friends.json");
    let mut api = FakeApi::default();
    api.respond(
        friend_page_url("someone", 1),
        json!({"friends": [{"username": "a"}, {"username": "b"}]}),
    );

    let report = update_friends(&mut api, "someone", &path).unwrap();

    assert_eq!(report.fetched, 2);
    let saved: Vec<Value> = read_json(&path).unwrap().unwrap();
    assert_eq!(saved[1]["username"], "b");
}

const CREATED_FEED: &str = "https://api.myanimelist.net/v2/forum/topics?user_name=someone&limit=100";
const POSTED_FEED: &str = "https://api.myanimelist.net/v2/forum/topics?topic_user_name=someone&limit=100";

fn topic_url(id: u64) -> String {
    format!("https://api.myanimelist.net/v2/forum/topic/{id}?limit=100")
}

fn post(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "body": format!("post {id}"),
        "created_at": "2021-01-01T00:00:00+00:00",
        "created_by": {"id": 1, "name": name}
    })
}

fn forum_api(stamp_7: &str) -> FakeApi {
    let mut api = FakeApi::default();
    api.respond(
        CREATED_FEED,
        json!({"data": [{"id": 7, "title": "Mine", "last_post_created_at": stamp_7}], "paging": {}}),
    );
    api.respond(
        POSTED_FEED,
        json!({"data": [
            {"id": 7, "title": "Mine", "last_post_created_at": stamp_7},
            {"id": 8, "title": "Theirs", "last_post_created_at": "2021-02-01T00:00:00+00:00"}
        ], "paging": {}}),
    );
    api.respond(
        topic_url(7),
        json!({"data": {"title": "Mine", "posts": [post(1, "someone")]}, "paging": {"next": "page2-of-7"}}),
    );
    api.respond(
        "page2-of-7",
        json!({"data": {"title": "Mine", "posts": [post(2, "other")]}, "paging": {}}),
    );
    api.respond(
        topic_url(8),
        json!({"data": {"title": "Theirs", "posts": [post(3, "someone")]}, "paging": {}}),
    );
    api
}

#[test]
fn test_forum_index_dedups_and_topics_merge_pages() {
    let temp = TempDir::new().unwrap();
    let mut store: ShardedStore<ForumTopic> = ShardedStore::open(temp.path().join("forum")).unwrap();
    let index_path = temp.path().join("forum").join("index.json");
    let mut api = forum_api("2021-01-05T00:00:00+00:00");

    let report = ForumSync::new(&mut api, &mut store, &index_path).run("someone").unwrap();

    assert_eq!(report.changed, 2);
    let index: Vec<Value> = read_json(&index_path).unwrap().unwrap();
    assert_eq!(index.len(), 2);
    let topic = store.load(7).unwrap().unwrap();
    assert_eq!(topic.posts.len(), 2);
    assert_eq!(topic.last_post_created_at.as_deref(), Some("2021-01-05T00:00:00+00:00"));
    assert_eq!(store.ids().unwrap(), vec![7, 8]);
}

#[test]
fn test_forum_refetches_only_topics_with_new_posts() {
    let temp = TempDir::new().unwrap();
    let mut store: ShardedStore<ForumTopic> = ShardedStore::open(temp.path().join("forum")).unwrap();
    let index_path = temp.path().join("forum").join("index.json");

    let mut api = forum_api("2021-01-05T00:00:00+00:00");
    ForumSync::new(&mut api, &mut store, &index_path).run("someone").unwrap();

    let mut api = forum_api("2021-03-01T00:00:00+00:00");
    let report = ForumSync::new(&mut api, &mut store, &index_path).run("someone").unwrap();

    assert_eq!(api.count(&topic_url(7)), 1);
    assert_eq!(api.count(&topic_url(8)), 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(
        store.load(7).unwrap().unwrap().last_post_created_at.as_deref(),
        Some("2021-03-01T00:00:00+00:00")
    );
}

#[test]
fn test_forum_second_run_fetches_no_topics() {
    let temp = TempDir::new().unwrap();
    let mut store: ShardedStore<ForumTopic> = ShardedStore::open(temp.path().join("forum")).unwrap();
    let index_path = temp.path().join("forum").join("index.json");

    let mut api = forum_api("2021-01-05T00:00:00+00:00");
    ForumSync::new(&mut api, &mut store, &index_path).run("someone").unwrap();
    let before = fs::read_to_string(temp.path().join("forum").join("7.json")).unwrap();

    let mut api = forum_api("2021-01-05T00:00:00+00:00");
    let report = ForumSync::new(&mut api, &mut store, &index_path).run("someone").unwrap();

    assert_eq!(report.changed, 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(api.count(&topic_url(7)), 0);
    assert_eq!(api.count(&topic_url(8)), 0);
    assert_eq!(fs::read_to_string(temp.path().join("forum").join("7.json")).unwrap(), before);
}

#[test]
fn test_forum_malformed_topic_is_skipped() {
    let temp = TempDir::new().unwrap();
    let mut store: ShardedStore<ForumTopic> = ShardedStore::open(temp.path().join("forum")).unwrap();
    let index_path = temp.path().join("forum").join("index.json");
    let mut api = forum_api("2021-01-05T00:00:00+00:00");
    api.respond(topic_url(7), json!({"error": "not_found", "message": ""}));

    let report = ForumSync::new(&mut api, &mut store, &index_path).run("someone").unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].contains("forum topic 7"));
    assert_eq!(api.count(&topic_url(8)), 1);
    assert_eq!(store.ids().unwrap(), vec![8]);
}

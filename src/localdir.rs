use anyhow::Result;
use std::path::PathBuf;

use crate::config::ConfigManager;
use crate::list_type::ListType;

/// On-disk layout for one account
///
/// ```text
/// {data_root}/{username}/data/       (the account directory, then data/)
///     animelist.json, mangalist.json          bulk list endpoint
///     animelist_api.json, mangalist_api.json  authenticated API lists
///     animelist.xml, mangalist.xml            XML exports (written elsewhere)
///     history/{anime,manga}/{id}.json         sharded history
///     anime_history.json, manga_history.json  merged history
///     forum/index.json, forum/{topic}.json
///     messages/{thread}.json
///     friends.json
/// ```
#[derive(Debug, Clone)]
pub struct LocalDir {
    pub account_dir: PathBuf,
    pub config_root: PathBuf,
    pub username: String,
}

impl LocalDir {
    pub fn new(data_root: impl Into<PathBuf>, config_root: impl Into<PathBuf>, username: &str) -> Self {
        let data_root: PathBuf = data_root.into();
        Self::for_account_dir(data_root.join(username), config_root, username)
    }

    /// Layout rooted at an arbitrary account directory, e.g. an extracted
    /// backup of one
    pub fn for_account_dir(account_dir: impl Into<PathBuf>, config_root: impl Into<PathBuf>, username: &str) -> Self {
        Self {
            account_dir: account_dir.into(),
            config_root: config_root.into(),
            username: username.to_string(),
        }
    }

    /// Use the default (or environment-configured) directories
    pub fn from_username(username: &str) -> Result<Self> {
        Ok(Self::new(
            ConfigManager::data_dir()?,
            ConfigManager::config_dir()?,
            username,
        ))
    }

    /// Root of this account's synced data
    pub fn data_dir(&self) -> PathBuf {
        self.account_dir.join("data")
    }

    pub fn list_path(&self, list_type: ListType) -> PathBuf {
        self.data_dir().join(format!("{list_type}list.json"))
    }

    pub fn api_list_path(&self, list_type: ListType) -> PathBuf {
        self.data_dir().join(format!("{list_type}list_api.json"))
    }

    pub fn export_path(&self, list_type: ListType) -> PathBuf {
        self.data_dir().join(format!("{list_type}list.xml"))
    }

    pub fn history_dir(&self, list_type: ListType) -> PathBuf {
        self.data_dir().join("history").join(list_type.as_str())
    }

    pub fn merged_history_path(&self, list_type: ListType) -> PathBuf {
        self.data_dir().join(format!("{list_type}_history.json"))
    }

    pub fn forum_dir(&self) -> PathBuf {
        self.data_dir().join("forum")
    }

    pub fn forum_index_path(&self) -> PathBuf {
        self.forum_dir().join("index.json")
    }

    pub fn messages_dir(&self) -> PathBuf {
        self.data_dir().join("messages")
    }

    pub fn friends_path(&self) -> PathBuf {
        self.data_dir().join("friends.json")
    }

    pub fn credential_path(&self) -> PathBuf {
        self.config_root.join(format!("{}.toml", self.username))
    }

    pub fn client_info_path(&self) -> PathBuf {
        self.config_root.join(format!("{}_client.toml", self.username))
    }

    pub fn refresh_info_path(&self) -> PathBuf {
        self.config_root.join(format!("{}_refresh.json", self.username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dir = LocalDir::new("/data", "/cfg", "someone");
        assert_eq!(dir.data_dir(), PathBuf::from("/data/someone/data"));
        assert_eq!(dir.list_path(ListType::Anime), PathBuf::from("/data/someone/data/animelist.json"));
        assert_eq!(
            dir.api_list_path(ListType::Manga),
            PathBuf::from("/data/someone/data/mangalist_api.json")
        );
        assert_eq!(
            dir.history_dir(ListType::Manga),
            PathBuf::from("/data/someone/data/history/manga")
        );
        assert_eq!(
            dir.merged_history_path(ListType::Anime),
            PathBuf::from("/data/someone/data/anime_history.json")
        );
        assert_eq!(dir.forum_index_path(), PathBuf::from("/data/someone/data/forum/index.json"));
        assert_eq!(dir.friends_path(), PathBuf::from("/data/someone/data/friends.json"));
        assert_eq!(dir.credential_path(), PathBuf::from("/cfg/someone.toml"));
    }

    #[test]
    fn test_backup_layout() {
        let dir = LocalDir::for_account_dir("/backups/2021-05-01", "/cfg", "someone");
        assert_eq!(
            dir.list_path(ListType::Anime),
            PathBuf::from("/backups/2021-05-01/data/animelist.json")
        );
    }
}

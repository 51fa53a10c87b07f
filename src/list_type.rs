use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the two list kinds a list-scoped resource belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Anime,
    Manga,
}

impl ListType {
    pub const ALL: [ListType; 2] = [ListType::Anime, ListType::Manga];

    /// Returns a human-readable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::Anime => "anime",
            ListType::Manga => "manga",
        }
    }

    /// Name of the numeric id field in list rows (`anime_id` / `manga_id`)
    pub fn id_field(&self) -> &'static str {
        match self {
            ListType::Anime => "anime_id",
            ListType::Manga => "manga_id",
        }
    }

    /// Both list types, or just the one selected with `--only`
    pub fn selected(only: Option<ListType>) -> Vec<ListType> {
        match only {
            Some(lt) => vec![lt],
            None => Self::ALL.to_vec(),
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anime" => Ok(ListType::Anime),
            "manga" => Ok(ListType::Manga),
            other => Err(format!("Unknown list type '{other}', expected anime or manga")),
        }
    }
}

/// The kinds of items the sync engine mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ListEntry,
    HistoryEntry,
    ForumTopic,
    MessageThread,
    FriendRecord,
    /// A whole API response, before it is known which item it belongs to
    ApiResponse,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ListEntry => "list entry",
            ResourceKind::HistoryEntry => "history entry",
            ResourceKind::ForumTopic => "forum topic",
            ResourceKind::MessageThread => "message thread",
            ResourceKind::FriendRecord => "friend",
            ResourceKind::ApiResponse => "API response",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_type_parse() {
        assert_eq!("anime".parse::<ListType>().unwrap(), ListType::Anime);
        assert_eq!("MANGA".parse::<ListType>().unwrap(), ListType::Manga);
        assert!("novel".parse::<ListType>().is_err());
    }

    #[test]
    fn test_list_type_serde() {
        let serialized = serde_json::to_string(&ListType::Manga).unwrap();
        assert_eq!(serialized, r#""manga""#);
        let deserialized: ListType = serde_json::from_str(r#""anime""#).unwrap();
        assert_eq!(deserialized, ListType::Anime);
    }

    #[test]
    fn test_selected() {
        assert_eq!(ListType::selected(None), vec![ListType::Anime, ListType::Manga]);
        assert_eq!(ListType::selected(Some(ListType::Manga)), vec![ListType::Manga]);
        assert_eq!(ListType::Anime.id_field(), "anime_id");
    }
}

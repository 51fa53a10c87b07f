use thiserror::Error;

use crate::list_type::ResourceKind;

/// Errors raised while fetching and persisting remote data.
///
/// Variants map to how the caller should react: retry the request, log in
/// again, give up on the resource kind, or skip a single item.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure, timeout or 5xx. Retried at the transport layer.
    #[error("Transient transport error for {url}: {message}")]
    Transient { url: String, message: String },

    /// HTTP 401, or the browser session is no longer logged in.
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    /// HTTP 400/403. The user has restricted access; retrying cannot help.
    #[error("Permission denied for {url}: the user has restricted access ({message})")]
    Permission { url: String, message: String },

    /// The page or response did not have the expected shape.
    #[error("Could not parse {kind} {shown_id}: {message}", shown_id = display_id(*.id))]
    Parse {
        kind: ResourceKind,
        id: Option<u64>,
        message: String,
    },

    /// A required input is missing before any fetch was attempted.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn display_id(id: Option<u64>) -> String {
    id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())
}

impl SyncError {
    pub fn transient(url: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transient {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(kind: ResourceKind, id: Option<u64>, message: impl Into<String>) -> Self {
        SyncError::Parse {
            kind,
            id,
            message: message.into(),
        }
    }

    /// Attribute a parse error to the item being fetched. Other errors are
    /// returned unchanged.
    pub fn for_item(self, kind: ResourceKind, id: u64) -> Self {
        match self {
            SyncError::Parse { message, .. } => SyncError::Parse {
                kind,
                id: Some(id),
                message,
            },
            other => other,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }

    /// Whether the error only affects the current item, so a scan may continue.
    pub fn is_item_local(&self) -> bool {
        matches!(self, SyncError::Parse { .. })
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SyncError::transient("http://x", "timeout").is_retryable());
        assert!(!SyncError::AuthExpired("401".into()).is_retryable());
        assert!(!SyncError::Permission {
            url: "http://x".into(),
            message: "403".into()
        }
        .is_retryable());

        let parse = SyncError::parse(ResourceKind::HistoryEntry, Some(1), "bad row");
        assert!(parse.is_item_local());
        assert!(!parse.is_retryable());
        assert!(!SyncError::Precondition("missing".into()).is_item_local());
    }

    #[test]
    fn test_parse_error_message_has_context() {
        let err = SyncError::parse(ResourceKind::MessageThread, Some(42), "no table");
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("no table"));
        assert!(msg.contains("message thread"));

        let err = SyncError::parse(ResourceKind::ForumTopic, None, "empty");
        assert!(err.to_string().contains("forum topic -"));
    }

    #[test]
    fn test_for_item_only_relabels_parse_errors() {
        let err = SyncError::parse(ResourceKind::ApiResponse, None, "no 'data' field")
            .for_item(ResourceKind::ForumTopic, 9);
        assert!(matches!(
            err,
            SyncError::Parse {
                kind: ResourceKind::ForumTopic,
                id: Some(9),
                ..
            }
        ));

        let err = SyncError::transient("http://x", "timeout").for_item(ResourceKind::ForumTopic, 9);
        assert!(err.is_retryable());
    }
}

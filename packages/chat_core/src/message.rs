use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender identity used for hub-originated replies.
pub const SYSTEM_USER_ID: &str = "system";
/// Display name used for hub-originated replies.
pub const SYSTEM_USERNAME: &str = "System";

/// What a [`Message`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    System,
    Join,
    Leave,
    Private,
    Error,
}

/// An immutable chat event.
///
/// Built once by whoever originates the event and passed around by value
/// afterwards; there are no mutators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub kind: MessageKind,
    /// Target channel; `None` for private and system messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        channel_id: Option<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            channel_id,
            user_id: user_id.into(),
            username: username.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// A hub-originated message not tied to any channel.
    pub fn system(kind: MessageKind, text: impl Into<String>) -> Self {
        Self::new(kind, None, SYSTEM_USER_ID, SYSTEM_USERNAME, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_fresh_ids() {
        let a = Message::new(MessageKind::Chat, Some("general".into()), "u1", "alice", "hi");
        let b = Message::new(MessageKind::Chat, Some("general".into()), "u1", "alice", "hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.channel_id.as_deref(), Some("general"));
        assert!(a.timestamp <= b.timestamp);
    }

    #[test]
    fn system_messages_use_system_sender() {
        let msg = Message::system(MessageKind::Error, "Unknown command: /foo");
        assert_eq!(msg.user_id, SYSTEM_USER_ID);
        assert_eq!(msg.username, SYSTEM_USERNAME);
        assert!(msg.channel_id.is_none());
    }

    #[test]
    fn kind_serializes_lowercase() {
        let msg = Message::system(MessageKind::Private, "psst");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "private");
        assert!(json.get("channel_id").is_none());
    }
}

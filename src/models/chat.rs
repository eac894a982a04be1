use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
    Broadcast,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
            ChatType::Broadcast => "broadcast",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ChatType::Direct),
            "group" => Some(ChatType::Group),
            "broadcast" => Some(ChatType::Broadcast),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Member,
    Admin,
    Owner,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Member => "member",
            ChatRole::Admin => "admin",
            ChatRole::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(ChatRole::Member),
            "admin" => Some(ChatRole::Admin),
            "owner" => Some(ChatRole::Owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Document,
    Sticker,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "video" => Some(MessageType::Video),
            "document" => Some(MessageType::Document),
            "sticker" => Some(MessageType::Sticker),
            _ => None,
        }
    }
}

/// A conversation with its denormalized member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub created_by: String,
    pub is_private: bool,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Direct chats are identified by their member pair, order-insensitive.
    pub fn has_same_members(&self, other: &[String]) -> bool {
        if self.members.len() != other.len() {
            return false;
        }
        let mut mine: Vec<&String> = self.members.iter().collect();
        let mut theirs: Vec<&String> = other.iter().collect();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMember {
    pub chat_id: String,
    pub user_id: String,
    pub role: ChatRole,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One message in a conversation log. `partition_date` is derived from
/// `created_at` on both the write and read path; it never travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub message_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Partition key component: YYYYMMDD of the message timestamp.
    pub fn partition_date(&self) -> i32 {
        partition_date(self.created_at)
    }
}

pub fn partition_date(at: DateTime<Utc>) -> i32 {
    at.format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
    Away,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Online => "online",
            PresenceState::Offline => "offline",
            PresenceState::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: String,
    pub status: PresenceState,
    pub last_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteLink {
    pub chat_id: String,
    pub code: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
    pub uses: i32,
}

impl InviteLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses > 0 && self.uses >= self.max_uses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn partition_date_is_utc_yyyymmdd() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(partition_date(at), 20250307);
        assert_eq!(partition_date(at + Duration::seconds(1)), 20250308);
    }

    #[test]
    fn direct_pair_matches_regardless_of_order() {
        let chat = Chat {
            id: "c1".into(),
            name: None,
            chat_type: ChatType::Direct,
            created_by: "1".into(),
            is_private: true,
            members: vec!["1".into(), "2".into()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(chat.has_same_members(&["2".into(), "1".into()]));
        assert!(!chat.has_same_members(&["1".into(), "3".into()]));
        assert!(!chat.has_same_members(&["1".into()]));
    }

    #[test]
    fn invite_expiry_and_capacity() {
        let now = Utc::now();
        let mut link = InviteLink {
            chat_id: "c1".into(),
            code: "abc123defg".into(),
            created_by: "1".into(),
            created_at: now,
            expires_at: now + Duration::hours(1),
            max_uses: 1,
            uses: 0,
        };
        assert!(!link.is_expired(now));
        assert!(!link.is_exhausted());

        link.uses = 1;
        assert!(link.is_exhausted());

        link.max_uses = 0;
        assert!(!link.is_exhausted());
        assert!(link.is_expired(now + Duration::hours(1)));
    }

    #[test]
    fn role_ordering_supports_minimum_role_guards() {
        assert!(ChatRole::Member < ChatRole::Admin);
        assert!(ChatRole::Admin < ChatRole::Owner);
        assert_eq!(ChatRole::parse("owner"), Some(ChatRole::Owner));
        assert_eq!(ChatRole::parse("superuser"), None);
    }

    #[test]
    fn message_wire_defaults() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"conversation_id":"c1","content":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.message_type, MessageType::Text);
        assert!(msg.message_id.is_empty());
        assert!(msg.sender_id.is_empty());
    }
}

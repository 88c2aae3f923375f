//! Domain types — the data model for content, schedules, and leads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of postable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Photo,
    Video,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Photo => "photo",
            ContentType::Video => "video",
            ContentType::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(ContentType::Photo),
            "video" => Some(ContentType::Video),
            "text" => Some(ContentType::Text),
            _ => None,
        }
    }
}

/// Content lifecycle state. Soft delete only — rows are never destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Active,
    Deleted,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Active => "active",
            ContentStatus::Deleted => "deleted",
        }
    }
}

/// A postable unit: photo or video (by opaque file id) or plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub content_type: ContentType,
    /// Opaque media handle (Telegram file_id) for photo/video.
    pub file_id: Option<String>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub status: ContentStatus,
    /// Gate for dispatch: false suppresses posting without deleting.
    pub publishing_enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Telegram id of the admin who created the item.
    pub created_by: i64,
}

impl Content {
    /// Whether the dispatcher may publish this item.
    pub fn is_postable(&self) -> bool {
        self.status == ContentStatus::Active && self.publishing_enabled
    }
}

/// A daily posting time slot ("HH:MM"), unique per time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    /// Normalized zero-padded "HH:MM".
    pub time_str: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a successful publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostLogEntry {
    pub id: i64,
    pub content_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub posted_at: DateTime<Utc>,
}

/// Lead lifecycle: pending until exactly one admin takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Pending,
    Taken,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Taken => "taken",
        }
    }
}

/// A customer message captured for admin follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    /// Row id in the users table.
    pub user_id: i64,
    /// Telegram id of the sender.
    pub telegram_user_id: i64,
    pub message_text: String,
    /// Content item that triggered the contact, when known.
    pub source_content_id: Option<i64>,
    pub status: LeadStatus,
    pub taken_by: Option<i64>,
    /// Independent of `status`; set by mark_answered, never reverted.
    pub answered: bool,
    pub answered_at: Option<DateTime<Utc>>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registered customer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin identity persisted by the registry (owners live in config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Key-value setting row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Channel-neutral inbound message, produced by the transport's polling
/// loop and consumed by the routing layer.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub username: Option<String>,
    pub text: String,
    /// Largest photo variant's media handle, when the message is a photo.
    pub photo_file_id: Option<String>,
    /// Media handle, when the message is a video.
    pub video_file_id: Option<String>,
    pub caption: Option<String>,
    /// Payload of a /start deep link, when present (e.g. "post_5").
    pub deep_link: Option<String>,
    /// Phone number from a shared contact, when the sender attached one.
    pub phone: Option<String>,
    pub is_private: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip() {
        for t in [ContentType::Photo, ContentType::Video, ContentType::Text] {
            assert_eq!(ContentType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ContentType::parse("sticker"), None);
    }

    #[test]
    fn test_postable_gates() {
        let mut content = Content {
            id: 1,
            content_type: ContentType::Text,
            file_id: None,
            text: Some("hello".into()),
            caption: None,
            status: ContentStatus::Active,
            publishing_enabled: true,
            created_at: Utc::now(),
            created_by: 42,
        };
        assert!(content.is_postable());
        content.publishing_enabled = false;
        assert!(!content.is_postable());
        content.publishing_enabled = true;
        content.status = ContentStatus::Deleted;
        assert!(!content.is_postable());
    }
}

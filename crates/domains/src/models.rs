//! # Domain Models
//!
//! These structs mirror the rows held by the hosted backend. The client only
//! ever holds cached copies of them; the backend owns the records.
//! Post, comment and notification ids are backend-assigned integers, user ids
//! are the UUIDs issued by the auth service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name used for comments posted with `is_anonymous`.
pub const ANONYMOUS_NAME: &str = "匿名用户";

/// Display name for profiles that never set a nickname.
pub const DEFAULT_NICKNAME: &str = "用户";

/// Object storage bucket holding post photos and avatars.
pub const POST_IMAGES_BUCKET: &str = "post-images";

/// Upper bound for a single uploaded image (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Locations offered as quick picks when publishing.
pub const COMMON_LOCATIONS: [&str; 8] = [
    "教室",
    "图书馆",
    "实验室",
    "宿舍",
    "食堂",
    "操场",
    "其他",
    "不是很清楚",
];

/// Whether a notice reports something lost or something found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Lost,
    Found,
}

impl PostKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PostKind::Lost => "lost",
            PostKind::Found => "found",
        }
    }
}

/// Lifecycle of a notice. Only the owner flips it, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Open,
    Closed,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Open => "open",
            PostStatus::Closed => "closed",
        }
    }

    /// Badge text shown next to a notice.
    pub fn label(self) -> &'static str {
        match self {
            PostStatus::Open => "寻找中",
            PostStatus::Closed => "已找回",
        }
    }
}

/// The six item categories a notice can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Study,
    Electronic,
    Daily,
    IdCard,
    Valuables,
    Others,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 6] = [
        ItemCategory::Study,
        ItemCategory::Electronic,
        ItemCategory::Daily,
        ItemCategory::IdCard,
        ItemCategory::Valuables,
        ItemCategory::Others,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemCategory::Study => "study",
            ItemCategory::Electronic => "electronic",
            ItemCategory::Daily => "daily",
            ItemCategory::IdCard => "id_card",
            ItemCategory::Valuables => "valuables",
            ItemCategory::Others => "others",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemCategory::Study => "学习用品类",
            ItemCategory::Electronic => "电子设备类",
            ItemCategory::Daily => "生活用品类",
            ItemCategory::IdCard => "证件与卡片类",
            ItemCategory::Valuables => "个人饰品与贵重物品",
            ItemCategory::Others => "其他",
        }
    }
}

/// Denormalized author reference embedded in posts and comments
/// (the `profiles` join of the backend query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRef {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

/// A lost or found notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub title: String,
    pub description: Option<String>,
    pub item_category: Option<ItemCategory>,
    pub location: Option<String>,
    pub lost_found_date: Option<NaiveDate>,
    /// Public URLs of the uploaded photos, in upload order.
    pub image_urls: Option<Vec<String>>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "profiles", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ProfileRef>,
}

impl Post {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn images(&self) -> &[String] {
        self.image_urls.as_deref().unwrap_or_default()
    }
}

/// Insert payload for `posts`. `status` is left out unless set so the
/// backend default (`open`) applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub title: String,
    pub description: Option<String>,
    pub item_category: Option<ItemCategory>,
    pub location: Option<String>,
    pub lost_found_date: Option<NaiveDate>,
    pub image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
}

/// A reply under a notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// Kept on anonymous comments too, for moderation.
    pub user_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "profiles", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ProfileRef>,
}

/// What a comment renders as its byline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorView {
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Comment {
    /// Byline for rendering. Anonymous comments never leak the profile,
    /// even when the joined reference is present.
    pub fn author(&self) -> AuthorView {
        if self.is_anonymous {
            return AuthorView {
                name: ANONYMOUS_NAME.to_string(),
                avatar_url: None,
            };
        }
        let profile = self.author.clone().unwrap_or_default();
        AuthorView {
            name: profile
                .nickname
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_NICKNAME.to_string()),
            avatar_url: profile.avatar_url,
        }
    }
}

/// Insert payload for `comments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: Option<Uuid>,
    pub content: String,
    pub is_anonymous: bool,
}

/// Inbox entry, shown on the messages screen and counted by the bell badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Public profile, created by the backend together with the auth identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_NICKNAME)
    }
}

/// Partial update for `profiles`; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// An authenticated principal as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Extra fields attached to a sign-up request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpMetadata {
    pub nickname: String,
    pub college: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_badge_and_wire_value() {
        assert_eq!(PostStatus::Open.label(), "寻找中");
        assert_eq!(PostStatus::Closed.label(), "已找回");
        assert_eq!(serde_json::to_value(PostStatus::Closed).unwrap(), json!("closed"));
    }

    #[test]
    fn test_location_quick_picks_are_distinct() {
        let mut picks = COMMON_LOCATIONS.to_vec();
        picks.sort_unstable();
        picks.dedup();
        assert_eq!(picks.len(), COMMON_LOCATIONS.len());
        assert!(COMMON_LOCATIONS.contains(&"其他"));
    }
}

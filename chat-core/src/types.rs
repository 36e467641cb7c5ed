use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Reactions outside this set are rejected.
pub const ALLOWED_EMOJI: &[&str] = &["👍", "👎", "❤️", "😂", "😮", "😢", "🎉", "🔥"];

pub fn is_allowed_emoji(emoji: &str) -> bool {
    ALLOWED_EMOJI.contains(&emoji)
}

/// Joins the two ids of a pair key. User ids must not contain it.
pub const PAIR_KEY_SEPARATOR: char = '|';

/// Canonical identity of a DM thread: both ids sorted, joined with `|`.
pub fn pair_key(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
    format!("{}{}{}", first, PAIR_KEY_SEPARATOR, second)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Dm,
    Group,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Dm => "dm",
            ContextKind::Group => "group",
        }
    }
}

impl FromStr for ContextKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(ContextKind::Dm),
            "group" => Ok(ContextKind::Group),
            other => Err(anyhow!("unknown context kind: {}", other)),
        }
    }
}

/// A DM thread or a group chat bound to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub id: Uuid,
    pub kind: ContextKind,
    pub pair_key: Option<String>,
    pub participant_a: Option<String>,
    pub participant_b: Option<String>,
    pub event_id: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ChatContext {
    pub fn is_dm(&self) -> bool {
        self.kind == ContextKind::Dm
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant_a.as_deref() == Some(user_id) || self.participant_b.as_deref() == Some(user_id)
    }

    /// For a DM thread, the participant that is not `user_id`.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        match (self.participant_a.as_deref(), self.participant_b.as_deref()) {
            (Some(a), Some(b)) if a == user_id => Some(b),
            (Some(a), Some(b)) if b == user_id => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Invited,
    Joined,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Invited => "INVITED",
            MemberStatus::Joined => "JOINED",
            MemberStatus::Left => "LEFT",
            MemberStatus::Banned => "BANNED",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INVITED" => Ok(MemberStatus::Invited),
            "JOINED" => Ok(MemberStatus::Joined),
            "LEFT" => Ok(MemberStatus::Left),
            "BANNED" => Ok(MemberStatus::Banned),
            other => Err(anyhow!("unknown member status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    Moderator,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "OWNER",
            MemberRole::Moderator => "MODERATOR",
            MemberRole::Member => "MEMBER",
        }
    }
}

impl FromStr for MemberRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(MemberRole::Owner),
            "MODERATOR" => Ok(MemberRole::Moderator),
            "MEMBER" => Ok(MemberRole::Member),
            other => Err(anyhow!("unknown member role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub context_id: Uuid,
    pub user_id: String,
    pub status: MemberStatus,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformRole {
    #[default]
    User,
    Admin,
}

/// The caller, as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    #[serde(default)]
    pub role: PlatformRole,
}

impl Actor {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: PlatformRole::User }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: PlatformRole::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == PlatformRole::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub context_id: Uuid,
    pub sender_id: String,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Soft-deleted messages are listed as tombstones without their content.
    pub fn into_visible(mut self) -> Self {
        if self.deleted_at.is_some() {
            self.content.clear();
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub context_id: Uuid,
    pub sender_id: String,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub items: Vec<Message>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DmMessage,
    GroupMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DmMessage => "dm_message",
            NotificationKind::GroupMessage => "group_message",
        }
    }

    pub fn for_context(kind: ContextKind) -> Self {
        match kind {
            ContextKind::Dm => NotificationKind::DmMessage,
            ContextKind::Group => NotificationKind::GroupMessage,
        }
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm_message" => Ok(NotificationKind::DmMessage),
            "group_message" => Ok(NotificationKind::GroupMessage),
            other => Err(anyhow!("unknown notification kind: {}", other)),
        }
    }
}

/// `<kind>:<recipientId>:<messageId>`, unique per logical event.
pub fn dedupe_key(kind: NotificationKind, recipient_id: &str, message_id: Uuid) -> String {
    format!("{}:{}:{}", kind.as_str(), recipient_id, message_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub entity_id: Uuid,
    pub context_id: Uuid,
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: Uuid,
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub entity_id: Uuid,
    pub context_id: Uuid,
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadMarker {
    pub context_id: Uuid,
    pub user_id: String,
    pub last_read_at: DateTime<Utc>,
}

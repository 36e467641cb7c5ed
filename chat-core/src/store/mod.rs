//! Narrow repository interfaces over the relational store.
//!
//! The store is the single source of truth. Only `MessageRepo::create_message`
//! and `MessageRepo::hard_delete` are required to be atomic: each pairs the row
//! change with the matching `message_count` adjustment on the context.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::cursor::CursorKey;
use crate::types::{
    ChatContext, Membership, Message, NewMessage, NewNotification, Notification, Reaction,
    ReadMarker,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ContextRepo: Send + Sync {
    async fn find_context(&self, id: Uuid) -> Result<Option<ChatContext>>;

    /// Insert-if-absent keyed by the pair key; returns the stored thread either way.
    async fn get_or_create_dm_thread(
        &self,
        user_a: &str,
        user_b: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatContext>;

    async fn create_group_context(&self, event_id: &str, now: DateTime<Utc>) -> Result<ChatContext>;

    async fn find_membership(&self, context_id: Uuid, user_id: &str) -> Result<Option<Membership>>;

    async fn upsert_membership(&self, membership: &Membership) -> Result<()>;

    async fn joined_member_ids(&self, context_id: Uuid) -> Result<Vec<String>>;

    /// True when either user has blocked the other.
    async fn is_blocked_between(&self, user_a: &str, user_b: &str) -> Result<bool>;

    async fn set_block(&self, blocker_id: &str, blocked_id: &str, blocked: bool) -> Result<()>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn find_message(&self, id: Uuid) -> Result<Option<Message>>;

    /// Insert the row and increment the context's message count atomically.
    async fn create_message(&self, new: NewMessage) -> Result<Message>;

    /// Rewrite a live message. `None` when it is absent or soft-deleted.
    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>>;

    /// Set `deleted_at` unless already set. Returns whether this call set it.
    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Remove the row and decrement the context's message count atomically.
    async fn hard_delete(&self, id: Uuid) -> Result<bool>;

    /// Up to `fetch` rows ordered `(created_at DESC, id DESC)`, strictly after `after`.
    async fn list_page(
        &self,
        context_id: Uuid,
        after: Option<CursorKey>,
        fetch: i64,
    ) -> Result<Vec<Message>>;

    async fn count_unread(&self, context_id: Uuid, user_id: &str, since: DateTime<Utc>) -> Result<i64>;

    /// Stamp `read_at` on the other party's unread messages created up to `up_to`.
    async fn mark_messages_read(
        &self,
        context_id: Uuid,
        reader_id: &str,
        up_to: DateTime<Utc>,
    ) -> Result<u64>;
}

#[async_trait]
pub trait MuteRepo: Send + Sync {
    async fn set_mute(&self, context_id: Uuid, user_id: &str, muted: bool, at: DateTime<Utc>) -> Result<()>;

    async fn muted_user_ids(&self, context_id: Uuid) -> Result<HashSet<String>>;
}

#[async_trait]
pub trait ReadMarkerRepo: Send + Sync {
    async fn find_read_marker(&self, context_id: Uuid, user_id: &str) -> Result<Option<ReadMarker>>;

    /// Forward-only: keeps the later of the stored and given timestamps and
    /// returns the one that ends up stored.
    async fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<DateTime<Utc>>;
}

#[async_trait]
pub trait ReactionRepo: Send + Sync {
    /// Upsert; returns false when the tuple already existed.
    async fn add_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Delete-if-exists; returns false when nothing matched.
    async fn remove_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str) -> Result<bool>;

    async fn list_reactions(&self, message_id: Uuid) -> Result<Vec<Reaction>>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    /// Bulk insert with skip-on-conflict on the dedupe key. Returns only new rows.
    async fn insert_notifications(&self, rows: Vec<NewNotification>) -> Result<Vec<Notification>>;

    async fn list_notifications(&self, recipient_id: &str, limit: i64) -> Result<Vec<Notification>>;

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>>;

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
}

/// Everything the chat core needs from the relational store.
pub trait ChatStore:
    ContextRepo + MessageRepo + MuteRepo + ReadMarkerRepo + ReactionRepo + NotificationRepo
{
}

impl<T> ChatStore for T where
    T: ContextRepo + MessageRepo + MuteRepo + ReadMarkerRepo + ReactionRepo + NotificationRepo
{
}

//! Single-process store used by tests and local development.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{ContextRepo, MessageRepo, MuteRepo, NotificationRepo, ReactionRepo, ReadMarkerRepo};
use crate::cursor::CursorKey;
use crate::types::{
    pair_key, ChatContext, ContextKind, MemberStatus, Membership, Message, NewMessage,
    NewNotification, Notification, Reaction, ReadMarker,
};

type UserKey = (Uuid, String);

#[derive(Default)]
struct State {
    contexts: HashMap<Uuid, ChatContext>,
    members: HashMap<UserKey, Membership>,
    blocks: HashSet<(String, String)>,
    messages: HashMap<Uuid, Message>,
    mutes: HashMap<UserKey, bool>,
    markers: HashMap<UserKey, DateTime<Utc>>,
    reactions: BTreeMap<(Uuid, String, String), Reaction>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_notifications: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notification insert fail, to exercise best-effort paths.
    pub fn fail_notification_writes(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    /// Every notification row ever written, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn key_of(message: &Message) -> CursorKey {
    CursorKey::new(message.created_at, message.id)
}

#[async_trait]
impl ContextRepo for InMemoryStore {
    async fn find_context(&self, id: Uuid) -> Result<Option<ChatContext>> {
        Ok(self.state().contexts.get(&id).cloned())
    }

    async fn get_or_create_dm_thread(
        &self,
        user_a: &str,
        user_b: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatContext> {
        let key = pair_key(user_a, user_b);
        let mut state = self.state();

        if let Some(existing) = state.contexts.values().find(|c| c.pair_key.as_deref() == Some(&key)) {
            return Ok(existing.clone());
        }

        let (low, high) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
        let context = ChatContext {
            id: Uuid::new_v4(),
            kind: ContextKind::Dm,
            pair_key: Some(key),
            participant_a: Some(low.to_string()),
            participant_b: Some(high.to_string()),
            event_id: None,
            message_count: 0,
            created_at: now,
        };
        state.contexts.insert(context.id, context.clone());
        Ok(context)
    }

    async fn create_group_context(&self, event_id: &str, now: DateTime<Utc>) -> Result<ChatContext> {
        let context = ChatContext {
            id: Uuid::new_v4(),
            kind: ContextKind::Group,
            pair_key: None,
            participant_a: None,
            participant_b: None,
            event_id: Some(event_id.to_string()),
            message_count: 0,
            created_at: now,
        };
        self.state().contexts.insert(context.id, context.clone());
        Ok(context)
    }

    async fn find_membership(&self, context_id: Uuid, user_id: &str) -> Result<Option<Membership>> {
        Ok(self.state().members.get(&(context_id, user_id.to_string())).cloned())
    }

    async fn upsert_membership(&self, membership: &Membership) -> Result<()> {
        self.state().members.insert(
            (membership.context_id, membership.user_id.clone()),
            membership.clone(),
        );
        Ok(())
    }

    async fn joined_member_ids(&self, context_id: Uuid) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .state()
            .members
            .values()
            .filter(|m| m.context_id == context_id && m.status == MemberStatus::Joined)
            .map(|m| m.user_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn is_blocked_between(&self, user_a: &str, user_b: &str) -> Result<bool> {
        let state = self.state();
        Ok(state.blocks.contains(&(user_a.to_string(), user_b.to_string()))
            || state.blocks.contains(&(user_b.to_string(), user_a.to_string())))
    }

    async fn set_block(&self, blocker_id: &str, blocked_id: &str, blocked: bool) -> Result<()> {
        let pair = (blocker_id.to_string(), blocked_id.to_string());
        let mut state = self.state();
        if blocked {
            state.blocks.insert(pair);
        } else {
            state.blocks.remove(&pair);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepo for InMemoryStore {
    async fn find_message(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.state().messages.get(&id).cloned())
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let mut state = self.state();
        let context = state
            .contexts
            .get_mut(&new.context_id)
            .ok_or_else(|| anyhow!("context {} does not exist", new.context_id))?;
        context.message_count += 1;

        let message = Message {
            id: new.id,
            context_id: new.context_id,
            sender_id: new.sender_id,
            content: new.content,
            reply_to_id: new.reply_to_id,
            created_at: new.created_at,
            edited_at: None,
            deleted_at: None,
            read_at: None,
        };
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        let mut state = self.state();
        match state.messages.get_mut(&id) {
            Some(message) if message.deleted_at.is_none() => {
                message.content = content.to_string();
                message.edited_at = Some(edited_at);
                Ok(Some(message.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state();
        match state.messages.get_mut(&id) {
            Some(message) if message.deleted_at.is_none() => {
                message.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state();
        let Some(message) = state.messages.remove(&id) else {
            return Ok(false);
        };

        if let Some(context) = state.contexts.get_mut(&message.context_id) {
            context.message_count -= 1;
        }
        state.reactions.retain(|(message_id, _, _), _| *message_id != id);
        for other in state.messages.values_mut() {
            if other.reply_to_id == Some(id) {
                other.reply_to_id = None;
            }
        }
        Ok(true)
    }

    async fn list_page(
        &self,
        context_id: Uuid,
        after: Option<CursorKey>,
        fetch: i64,
    ) -> Result<Vec<Message>> {
        let state = self.state();
        let mut rows: Vec<Message> = state
            .messages
            .values()
            .filter(|m| m.context_id == context_id)
            .filter(|m| after.map_or(true, |cursor| key_of(m) < cursor))
            .cloned()
            .collect();

        rows.sort_by(|a, b| key_of(b).cmp(&key_of(a)));
        rows.truncate(fetch.max(0) as usize);
        Ok(rows)
    }

    async fn count_unread(&self, context_id: Uuid, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let count = self
            .state()
            .messages
            .values()
            .filter(|m| m.context_id == context_id)
            .filter(|m| m.sender_id != user_id && m.deleted_at.is_none() && m.created_at > since)
            .count();
        Ok(count as i64)
    }

    async fn mark_messages_read(
        &self,
        context_id: Uuid,
        reader_id: &str,
        up_to: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state();
        let mut stamped = 0;
        for message in state.messages.values_mut() {
            if message.context_id == context_id
                && message.sender_id != reader_id
                && message.read_at.is_none()
                && message.created_at <= up_to
            {
                message.read_at = Some(up_to);
                stamped += 1;
            }
        }
        Ok(stamped)
    }
}

#[async_trait]
impl MuteRepo for InMemoryStore {
    async fn set_mute(&self, context_id: Uuid, user_id: &str, muted: bool, _at: DateTime<Utc>) -> Result<()> {
        self.state().mutes.insert((context_id, user_id.to_string()), muted);
        Ok(())
    }

    async fn muted_user_ids(&self, context_id: Uuid) -> Result<HashSet<String>> {
        Ok(self
            .state()
            .mutes
            .iter()
            .filter(|((ctx, _), muted)| *ctx == context_id && **muted)
            .map(|((_, user), _)| user.clone())
            .collect())
    }
}

#[async_trait]
impl ReadMarkerRepo for InMemoryStore {
    async fn find_read_marker(&self, context_id: Uuid, user_id: &str) -> Result<Option<ReadMarker>> {
        Ok(self
            .state()
            .markers
            .get(&(context_id, user_id.to_string()))
            .map(|at| ReadMarker {
                context_id,
                user_id: user_id.to_string(),
                last_read_at: *at,
            }))
    }

    async fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<DateTime<Utc>> {
        let mut state = self.state();
        let stored = state
            .markers
            .entry((marker.context_id, marker.user_id.clone()))
            .or_insert(marker.last_read_at);
        if marker.last_read_at > *stored {
            *stored = marker.last_read_at;
        }
        Ok(*stored)
    }
}

#[async_trait]
impl ReactionRepo for InMemoryStore {
    async fn add_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str, at: DateTime<Utc>) -> Result<bool> {
        let key = (message_id, user_id.to_string(), emoji.to_string());
        let mut state = self.state();
        if state.reactions.contains_key(&key) {
            return Ok(false);
        }
        state.reactions.insert(
            key,
            Reaction {
                message_id,
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
                created_at: at,
            },
        );
        Ok(true)
    }

    async fn remove_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str) -> Result<bool> {
        let key = (message_id, user_id.to_string(), emoji.to_string());
        Ok(self.state().reactions.remove(&key).is_some())
    }

    async fn list_reactions(&self, message_id: Uuid) -> Result<Vec<Reaction>> {
        Ok(self
            .state()
            .reactions
            .values()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepo for InMemoryStore {
    async fn insert_notifications(&self, rows: Vec<NewNotification>) -> Result<Vec<Notification>> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(anyhow!("notification store unavailable"));
        }

        let mut state = self.state();
        let mut inserted = Vec::new();
        for row in rows {
            if state.notifications.iter().any(|n| n.dedupe_key == row.dedupe_key) {
                continue;
            }
            let notification = Notification {
                id: row.id,
                recipient_id: row.recipient_id,
                actor_id: row.actor_id,
                kind: row.kind,
                entity_id: row.entity_id,
                context_id: row.context_id,
                dedupe_key: row.dedupe_key,
                created_at: row.created_at,
                read_at: None,
            };
            state.notifications.push(notification.clone());
            inserted.push(notification);
        }
        Ok(inserted)
    }

    async fn list_notifications(&self, recipient_id: &str, limit: i64) -> Result<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .state()
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.state().notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state();
        match state.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) if notification.read_at.is_none() => {
                notification.read_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

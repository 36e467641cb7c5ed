//! Message state transitions.
//!
//! ```text
//! Active --edit--> Active (edited_at set)
//! Active --soft delete--> SoftDeleted (terminal)
//! Active --hard delete--> gone (terminal, owner/admin only)
//! ```
//!
//! Authorization against the context happens in the guard first; the checks
//! here are the per-message rules: authorship, time windows, current state.

use chat_core::store::MessageRepo;
use chat_core::types::{Message, MessagePage, NewMessage};
use chat_core::{ChatError, ChatResult, ChatSettings, ChatStore, Clock, Cursor, CursorKey};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

use crate::guard::Access;

/// Trim, drop control characters other than newline and tab, enforce length.
pub fn sanitize_content(raw: &str, max_chars: usize) -> ChatResult<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    if cleaned.is_empty() {
        return Err(ChatError::bad_input("message content cannot be empty"));
    }

    let length = cleaned.chars().count();
    if length > max_chars {
        return Err(ChatError::bad_input(format!(
            "message content is {} characters, the limit is {}",
            length, max_chars
        )));
    }

    Ok(cleaned)
}

#[derive(Clone)]
pub struct MessageLifecycle {
    store: Arc<dyn ChatStore>,
    clock: Arc<dyn Clock>,
    settings: Arc<ChatSettings>,
}

impl MessageLifecycle {
    pub fn new(store: Arc<dyn ChatStore>, clock: Arc<dyn Clock>, settings: Arc<ChatSettings>) -> Self {
        Self { store, clock, settings }
    }

    pub async fn find(&self, message_id: Uuid) -> ChatResult<Message> {
        self.store
            .find_message(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message"))
    }

    pub async fn create(&self, access: &Access, content: &str, reply_to_id: Option<Uuid>) -> ChatResult<Message> {
        let content = sanitize_content(content, self.settings.max_content_chars)?;

        if let Some(reply_to_id) = reply_to_id {
            let target = self.store.find_message(reply_to_id).await?;
            match target {
                Some(t) if t.context_id == access.context.id && !t.is_deleted() => {}
                _ => return Err(ChatError::bad_input("reply target is not a message in this chat")),
            }
        }

        let new = NewMessage {
            id: Uuid::new_v4(),
            context_id: access.context.id,
            sender_id: access.user_id().to_string(),
            content,
            reply_to_id,
            created_at: self.clock.now(),
        };

        let message = self.store.create_message(new).await.map_err(|e| {
            tracing::error!("Failed to store message in {}: {}", access.context.id, e);
            ChatError::Internal(e)
        })?;

        tracing::info!("Message {} created in {} by {}", message.id, message.context_id, message.sender_id);
        Ok(message)
    }

    pub async fn edit(&self, access: &Access, message: &Message, content: &str) -> ChatResult<Message> {
        if message.sender_id != access.user_id() {
            return Err(ChatError::forbidden("only the sender can edit a message"));
        }
        if message.is_deleted() {
            return Err(ChatError::precondition("message has been deleted"));
        }

        let now = self.clock.now();
        if now - message.created_at > self.settings.edit_window() {
            return Err(ChatError::precondition(format!(
                "messages can only be edited within {} seconds",
                self.settings.edit_window_secs
            )));
        }

        let content = sanitize_content(content, self.settings.max_content_chars)?;
        // The store only rewrites live rows; a concurrent delete leaves nothing to update
        let Some(edited) = self.store.update_content(message.id, &content, now).await? else {
            return match self.store.find_message(message.id).await? {
                Some(_) => Err(ChatError::precondition("message has been deleted")),
                None => Err(ChatError::not_found("message")),
            };
        };

        tracing::info!("Message {} edited by {}", edited.id, edited.sender_id);
        Ok(edited)
    }

    /// True on success, including when the message was already soft-deleted.
    pub async fn soft_delete(&self, access: &Access, message: &Message) -> ChatResult<bool> {
        let now = self.clock.now();
        let is_sender = message.sender_id == access.user_id();

        // A repeat by someone who could have deleted it is a no-op success, whenever it arrives
        if message.is_deleted() && (is_sender || access.can_moderate) {
            return Ok(true);
        }

        let within_window = now - message.created_at <= self.settings.delete_window();
        if !access.can_moderate && !(is_sender && within_window) {
            let reason = if is_sender {
                "the delete window for this message has passed"
            } else {
                "only the sender or a moderator can delete a message"
            };
            return Err(ChatError::forbidden(reason));
        }

        if self.store.soft_delete(message.id, now).await? {
            tracing::info!("Message {} soft-deleted by {}", message.id, access.user_id());
        }
        Ok(true)
    }

    /// Caller must hold owner access. False when the row was already gone.
    pub async fn hard_delete(&self, access: &Access, message_id: Uuid) -> ChatResult<bool> {
        let removed = self.store.hard_delete(message_id).await.map_err(|e| {
            tracing::error!("Failed to hard-delete message {}: {}", message_id, e);
            ChatError::Internal(e)
        })?;

        if removed {
            tracing::info!("Message {} hard-deleted by {}", message_id, access.user_id());
        }
        Ok(removed)
    }

    pub fn page_size(&self, limit: Option<i64>) -> i64 {
        self.settings.page_size(limit)
    }

    /// Newest first over `(created_at, id)`. One extra row is fetched to learn
    /// whether another page exists.
    pub async fn list(&self, context_id: Uuid, cursor: Option<&str>, limit: Option<i64>) -> ChatResult<MessagePage> {
        let after = match cursor.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => Some(Cursor::decode(raw).map_err(|e| ChatError::bad_input(e.to_string()))?),
            None => None,
        };

        let limit = self.page_size(limit);
        let mut rows = self.store.list_page(context_id, after, limit + 1).await?;

        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);

        let cursor = rows
            .last()
            .map(|last| Cursor::encode(CursorKey::new(last.created_at, last.id)));

        Ok(MessagePage {
            items: rows.into_iter().map(Message::into_visible).collect(),
            cursor,
            has_more,
        })
    }
}

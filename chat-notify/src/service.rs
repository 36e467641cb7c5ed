use anyhow::Result;
use chat_core::counter::bounded;
use chat_core::store::{ContextRepo, MuteRepo, NotificationRepo};
use chat_core::types::{dedupe_key, ChatContext, Message, NewNotification, Notification, NotificationKind};
use chat_core::{Broadcaster, ChatError, ChatEvent, ChatResult, ChatStore, Clock, Topic};
use std::sync::Arc;
use std::time::Duration;
use tracing;
use uuid::Uuid;

const MAX_INBOX_PAGE: i64 = 100;

/// Turns a persisted message into per-recipient notification rows.
///
/// Fanout sits outside the send transaction. Callers treat its errors as
/// advisory: the message already exists whatever happens here.
#[derive(Clone)]
pub struct NotificationFanout {
    store: Arc<dyn ChatStore>,
    bus: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    aux_timeout: Duration,
}

impl NotificationFanout {
    pub fn new(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        aux_timeout: Duration,
    ) -> Self {
        Self { store, bus, clock, aux_timeout }
    }

    /// The other DM participant, or every JOINED group member except the sender,
    /// minus anyone who muted the context.
    pub async fn recipients(&self, context: &ChatContext, sender_id: &str) -> Result<Vec<String>> {
        let candidates = if context.is_dm() {
            context
                .other_participant(sender_id)
                .map(|other| vec![other.to_string()])
                .unwrap_or_default()
        } else {
            self.store
                .joined_member_ids(context.id)
                .await?
                .into_iter()
                .filter(|member| member != sender_id)
                .collect()
        };

        if candidates.is_empty() {
            return Ok(candidates);
        }

        let muted = self.store.muted_user_ids(context.id).await?;
        Ok(candidates.into_iter().filter(|user| !muted.contains(user)).collect())
    }

    /// Persist one notification per recipient and push each new row live.
    /// Returns only rows created by this call; repeats hit the dedupe key.
    pub async fn fanout(&self, context: &ChatContext, message: &Message) -> Result<Vec<Notification>> {
        let recipients = self.recipients(context, &message.sender_id).await?;
        if recipients.is_empty() {
            tracing::debug!("No notification recipients for message {}", message.id);
            return Ok(Vec::new());
        }

        let kind = NotificationKind::for_context(context.kind);
        let now = self.clock.now();
        let rows = recipients
            .iter()
            .map(|recipient| NewNotification {
                id: Uuid::new_v4(),
                recipient_id: recipient.clone(),
                actor_id: message.sender_id.clone(),
                kind,
                entity_id: message.id,
                context_id: context.id,
                dedupe_key: dedupe_key(kind, recipient, message.id),
                created_at: now,
            })
            .collect();

        let created = self.store.insert_notifications(rows).await?;
        tracing::debug!(
            "Fanout for message {}: {} recipients, {} new notifications",
            message.id,
            recipients.len(),
            created.len()
        );

        for notification in &created {
            self.push(notification).await;
        }

        Ok(created)
    }

    async fn push(&self, notification: &Notification) {
        let topic = Topic::notifications(&notification.recipient_id);
        let event = ChatEvent::NotificationAdded { notification: notification.clone() };

        if let Err(e) = bounded(self.aux_timeout, "notification push", self.bus.publish(&topic, &event)).await {
            tracing::warn!("Failed to push notification {}: {}", notification.id, e);
        }
    }

    /// Newest first, clamped to a sane page.
    pub async fn list_for(&self, recipient_id: &str, limit: i64) -> ChatResult<Vec<Notification>> {
        let limit = limit.clamp(1, MAX_INBOX_PAGE);
        Ok(self.store.list_notifications(recipient_id, limit).await?)
    }

    /// Idempotent. Only the recipient may mark a notification read.
    pub async fn mark_read(&self, notification_id: Uuid, recipient_id: &str) -> ChatResult<bool> {
        let notification = self
            .store
            .find_notification(notification_id)
            .await?
            .ok_or_else(|| ChatError::not_found("notification"))?;

        if notification.recipient_id != recipient_id {
            return Err(ChatError::forbidden("not the recipient of this notification"));
        }

        if notification.read_at.is_some() {
            return Ok(true);
        }

        self.store
            .mark_notification_read(notification_id, self.clock.now())
            .await?;
        Ok(true)
    }
}

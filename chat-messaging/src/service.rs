//! The chat operations as plain handler functions: `(input, actor) -> Result`.
//!
//! Every operation runs guard, then rate limit, then the store mutation.
//! Broadcast, cache invalidation and notification fanout follow the durable
//! write and never fail it.

use chat_core::counter::bounded;
use chat_core::store::{ContextRepo, MessageRepo, MuteRepo};
use chat_core::types::{Actor, ChatContext, Message, MessagePage, Notification};
use chat_core::{
    Broadcaster, ChatError, ChatEvent, ChatResult, ChatSettings, ChatStore, Clock, CounterStore, Topic,
};
use chat_notify::NotificationFanout;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

use crate::guard::{require_actor, Access, Capability, Guard};
use crate::lifecycle::MessageLifecycle;
use crate::rate_limit::{Action, RateLimiter};
use crate::reactions::ReactionLedger;
use crate::subscription::Subscription;
use crate::unread::UnreadTracker;

/// Where notification fanout runs relative to the send call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutMode {
    /// Awaited before `send_message` returns.
    Inline,
    /// Spawned onto the runtime; `send_message` returns first.
    Background,
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    bus: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    settings: Arc<ChatSettings>,
    guard: Guard,
    limiter: RateLimiter,
    lifecycle: MessageLifecycle,
    reactions: ReactionLedger,
    unread: UnreadTracker,
    fanout: NotificationFanout,
    fanout_mode: FanoutMode,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        counters: Arc<dyn CounterStore>,
        bus: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        settings: ChatSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let aux_timeout = settings.aux_timeout();

        Self {
            guard: Guard::new(store.clone()),
            limiter: RateLimiter::new(counters.clone(), settings.clone()),
            lifecycle: MessageLifecycle::new(store.clone(), clock.clone(), settings.clone()),
            reactions: ReactionLedger::new(store.clone(), bus.clone(), clock.clone(), aux_timeout),
            unread: UnreadTracker::new(store.clone(), counters, clock.clone(), settings.clone()),
            fanout: NotificationFanout::new(store.clone(), bus.clone(), clock.clone(), aux_timeout),
            fanout_mode: FanoutMode::Background,
            store,
            bus,
            clock,
            settings,
        }
    }

    pub fn with_fanout_mode(mut self, mode: FanoutMode) -> Self {
        self.fanout_mode = mode;
        self
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    // Threads

    /// The DM thread between the caller and `other_id`, created on first use.
    pub async fn get_or_create_dm_thread(&self, actor: Option<&Actor>, other_id: &str) -> ChatResult<ChatContext> {
        self.guard.authorize_dm_target(actor, other_id).await?;
        let actor = require_actor(actor)?;

        let other_id = other_id.trim();
        let context = self
            .store
            .get_or_create_dm_thread(&actor.user_id, other_id, self.clock.now())
            .await?;

        if !context.is_participant(&actor.user_id) || !context.is_participant(other_id) {
            tracing::error!("DM thread {} does not belong to {} and {}", context.id, actor.user_id, other_id);
            return Err(ChatError::Internal(anyhow::anyhow!("dm thread resolved to a different pair")));
        }
        tracing::debug!("DM thread {} resolved for {}", context.id, actor.user_id);
        Ok(context)
    }

    // Messages

    pub async fn send_message(
        &self,
        actor: Option<&Actor>,
        context_id: Uuid,
        content: &str,
        reply_to_id: Option<Uuid>,
    ) -> ChatResult<Message> {
        let access = self.guard.authorize(actor, context_id, Capability::Member).await?;
        self.limiter.check(Action::Send, access.user_id(), Some(context_id)).await?;

        let message = self.lifecycle.create(&access, content, reply_to_id).await?;
        self.after_send(&access.context, &message).await;
        Ok(message)
    }

    /// Resolve the DM thread with `recipient_id`, then send into it.
    pub async fn send_direct_message(
        &self,
        actor: Option<&Actor>,
        recipient_id: &str,
        content: &str,
        reply_to_id: Option<Uuid>,
    ) -> ChatResult<Message> {
        let context = self.get_or_create_dm_thread(actor, recipient_id).await?;
        self.send_message(actor, context.id, content, reply_to_id).await
    }

    pub async fn edit_message(&self, actor: Option<&Actor>, message_id: Uuid, content: &str) -> ChatResult<Message> {
        require_actor(actor)?;
        let message = self.lifecycle.find(message_id).await?;
        let access = self.guard.authorize(actor, message.context_id, Capability::Member).await?;
        self.limiter.check(Action::Edit, access.user_id(), None).await?;

        let edited = self.lifecycle.edit(&access, &message, content).await?;
        self.publish(
            &Topic::message_edited(edited.context_id),
            &ChatEvent::MessageEdited { message: edited.clone() },
        )
        .await;
        Ok(edited)
    }

    /// Idempotent: `false` when the message does not exist, `true` otherwise.
    pub async fn delete_message(&self, actor: Option<&Actor>, message_id: Uuid, soft: bool) -> ChatResult<bool> {
        require_actor(actor)?;
        let Some(message) = self.store.find_message(message_id).await? else {
            return Ok(false);
        };

        let capability = if soft { Capability::Member } else { Capability::Owner };
        let access = self.guard.authorize(actor, message.context_id, capability).await?;
        self.limiter.check(Action::Delete, access.user_id(), None).await?;

        let changed = if soft {
            self.lifecycle.soft_delete(&access, &message).await? && !message.is_deleted()
        } else {
            self.lifecycle.hard_delete(&access, message.id).await?
        };

        if changed {
            self.publish(
                &Topic::message_deleted(message.context_id),
                &ChatEvent::MessageDeleted {
                    context_id: message.context_id,
                    message_id: message.id,
                    deleted_at: self.clock.now(),
                    hard: !soft,
                },
            )
            .await;

            // A tombstone no longer counts as unread for anyone
            if !message.is_deleted() {
                let audience = self.audience(&access.context, &message.sender_id).await;
                self.unread.invalidate(message.context_id, &audience).await;
            }
        }

        // Repeated soft deletes report success; a hard delete reports whether it removed the row
        Ok(soft || changed)
    }

    pub async fn list_messages(
        &self,
        actor: Option<&Actor>,
        context_id: Uuid,
        after_cursor: Option<&str>,
        limit: Option<i64>,
    ) -> ChatResult<MessagePage> {
        self.guard.authorize(actor, context_id, Capability::Member).await?;
        self.lifecycle.list(context_id, after_cursor, limit).await
    }

    // Read state

    pub async fn mark_read(&self, actor: Option<&Actor>, context_id: Uuid, at: Option<DateTime<Utc>>) -> ChatResult<bool> {
        let access = self.guard.authorize(actor, context_id, Capability::Member).await?;
        self.unread.mark_read(&access, at).await
    }

    pub async fn unread_count(&self, actor: Option<&Actor>, context_id: Uuid) -> ChatResult<i64> {
        let access = self.guard.authorize(actor, context_id, Capability::Member).await?;
        self.unread.unread_count(context_id, access.user_id()).await
    }

    // Reactions

    pub async fn add_reaction(&self, actor: Option<&Actor>, message_id: Uuid, emoji: &str) -> ChatResult<bool> {
        let (access, message) = self.message_access(actor, message_id).await?;
        self.limiter.check(Action::React, access.user_id(), None).await?;
        self.reactions.add(&access, &message, emoji).await
    }

    pub async fn remove_reaction(&self, actor: Option<&Actor>, message_id: Uuid, emoji: &str) -> ChatResult<bool> {
        let (access, message) = self.message_access(actor, message_id).await?;
        self.limiter.check(Action::React, access.user_id(), None).await?;
        self.reactions.remove(&access, &message, emoji).await
    }

    async fn message_access(&self, actor: Option<&Actor>, message_id: Uuid) -> ChatResult<(Access, Message)> {
        require_actor(actor)?;
        let message = self.lifecycle.find(message_id).await?;
        let access = self.guard.authorize(actor, message.context_id, Capability::Member).await?;
        Ok((access, message))
    }

    // Presence and preferences

    pub async fn set_typing(&self, actor: Option<&Actor>, context_id: Uuid, is_typing: bool) -> ChatResult<bool> {
        let access = self.guard.authorize(actor, context_id, Capability::Member).await?;
        self.publish(
            &Topic::typing(context_id),
            &ChatEvent::TypingChanged {
                context_id,
                user_id: access.user_id().to_string(),
                is_typing,
            },
        )
        .await;
        Ok(true)
    }

    pub async fn set_mute(&self, actor: Option<&Actor>, context_id: Uuid, muted: bool) -> ChatResult<bool> {
        let access = self.guard.authorize(actor, context_id, Capability::Member).await?;
        self.store
            .set_mute(context_id, access.user_id(), muted, self.clock.now())
            .await?;
        tracing::info!("{} {} context {}", access.user_id(), if muted { "muted" } else { "unmuted" }, context_id);
        Ok(true)
    }

    // Subscriptions

    pub async fn subscribe_messages(&self, actor: Option<&Actor>, context_id: Uuid) -> ChatResult<Subscription> {
        self.subscribe_context(actor, context_id, &Topic::messages(context_id)).await
    }

    pub async fn subscribe_typing(&self, actor: Option<&Actor>, context_id: Uuid) -> ChatResult<Subscription> {
        self.subscribe_context(actor, context_id, &[Topic::typing(context_id)]).await
    }

    pub async fn subscribe_reactions(&self, actor: Option<&Actor>, context_id: Uuid) -> ChatResult<Subscription> {
        self.subscribe_context(actor, context_id, &[Topic::reactions(context_id)]).await
    }

    async fn subscribe_context(&self, actor: Option<&Actor>, context_id: Uuid, topics: &[Topic]) -> ChatResult<Subscription> {
        let access = self.guard.authorize(actor, context_id, Capability::Member).await?;
        let events = self.bus.subscribe_all(topics).await?;

        Ok(Subscription::guarded(
            events,
            self.guard.clone(),
            access.actor,
            context_id,
            self.settings.subscription_revalidate(),
        ))
    }

    pub async fn subscribe_notifications(&self, actor: Option<&Actor>) -> ChatResult<Subscription> {
        let actor = require_actor(actor)?;
        let events = self.bus.subscribe(&Topic::notifications(&actor.user_id)).await?;
        Ok(Subscription::unguarded(events))
    }

    // Notifications

    pub async fn list_notifications(&self, actor: Option<&Actor>, limit: Option<i64>) -> ChatResult<Vec<Notification>> {
        let actor = require_actor(actor)?;
        self.fanout
            .list_for(&actor.user_id, self.settings.page_size(limit))
            .await
    }

    pub async fn mark_notification_read(&self, actor: Option<&Actor>, notification_id: Uuid) -> ChatResult<bool> {
        let actor = require_actor(actor)?;
        self.fanout.mark_read(notification_id, &actor.user_id).await
    }

    // Side effects

    async fn after_send(&self, context: &ChatContext, message: &Message) {
        self.publish(
            &Topic::message_added(context.id),
            &ChatEvent::MessageAdded { message: message.clone() },
        )
        .await;

        let audience = self.audience(context, &message.sender_id).await;
        self.unread.invalidate(context.id, &audience).await;

        match self.fanout_mode {
            FanoutMode::Inline => run_fanout(&self.fanout, context, message).await,
            FanoutMode::Background => {
                let fanout = self.fanout.clone();
                let context = context.clone();
                let message = message.clone();
                tokio::spawn(async move {
                    run_fanout(&fanout, &context, &message).await;
                });
            }
        }
    }

    /// Everyone besides `sender_id` who can read the context, muted or not.
    async fn audience(&self, context: &ChatContext, sender_id: &str) -> Vec<String> {
        if context.is_dm() {
            return context
                .other_participant(sender_id)
                .map(|other| vec![other.to_string()])
                .unwrap_or_default();
        }

        match self.store.joined_member_ids(context.id).await {
            Ok(members) => members.into_iter().filter(|m| m != sender_id).collect(),
            Err(e) => {
                tracing::warn!("Failed to load members of {} for cache invalidation: {}", context.id, e);
                Vec::new()
            }
        }
    }

    async fn publish(&self, topic: &Topic, event: &ChatEvent) {
        let timeout = self.settings.aux_timeout();
        if let Err(e) = bounded(timeout, "broadcast", self.bus.publish(topic, event)).await {
            tracing::warn!("Failed to broadcast on {}: {}", topic, e);
        }
    }
}

async fn run_fanout(fanout: &NotificationFanout, context: &ChatContext, message: &Message) {
    if let Err(e) = fanout.fanout(context, message).await {
        tracing::warn!("Notification fanout failed for message {}: {}", message.id, e);
    }
}


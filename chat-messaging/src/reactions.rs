use chat_core::counter::bounded;
use chat_core::store::ReactionRepo;
use chat_core::types::{is_allowed_emoji, Message, Reaction, ReactionAction};
use chat_core::{Broadcaster, ChatError, ChatEvent, ChatResult, ChatStore, Clock, Topic};
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::guard::Access;

/// Idempotent bookkeeping of `(message, user, emoji)` tuples.
#[derive(Clone)]
pub struct ReactionLedger {
    store: Arc<dyn ChatStore>,
    bus: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    aux_timeout: Duration,
}

impl ReactionLedger {
    pub fn new(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        aux_timeout: Duration,
    ) -> Self {
        Self { store, bus, clock, aux_timeout }
    }

    fn validate(emoji: &str) -> ChatResult<&str> {
        let emoji = emoji.trim();
        if !is_allowed_emoji(emoji) {
            return Err(ChatError::bad_input(format!("emoji {:?} is not allowed", emoji)));
        }
        Ok(emoji)
    }

    /// Re-adding an existing reaction succeeds without writing or publishing.
    pub async fn add(&self, access: &Access, message: &Message, emoji: &str) -> ChatResult<bool> {
        let emoji = Self::validate(emoji)?;
        if message.is_deleted() {
            return Err(ChatError::precondition("cannot react to a deleted message"));
        }

        let added = self
            .store
            .add_reaction(message.id, access.user_id(), emoji, self.clock.now())
            .await?;

        if added {
            self.publish(access, message, emoji, ReactionAction::Add).await;
        }
        Ok(true)
    }

    /// Removing an absent reaction succeeds without publishing.
    pub async fn remove(&self, access: &Access, message: &Message, emoji: &str) -> ChatResult<bool> {
        let emoji = Self::validate(emoji)?;

        let removed = self
            .store
            .remove_reaction(message.id, access.user_id(), emoji)
            .await?;

        if removed {
            self.publish(access, message, emoji, ReactionAction::Remove).await;
        }
        Ok(true)
    }

    pub async fn list(&self, message: &Message) -> ChatResult<Vec<Reaction>> {
        Ok(self.store.list_reactions(message.id).await?)
    }

    async fn publish(&self, access: &Access, message: &Message, emoji: &str, action: ReactionAction) {
        let event = ChatEvent::ReactionChanged {
            context_id: message.context_id,
            message_id: message.id,
            user_id: access.user_id().to_string(),
            emoji: emoji.to_string(),
            action,
        };
        let topic = Topic::reactions(message.context_id);

        if let Err(e) = bounded(self.aux_timeout, "reaction publish", self.bus.publish(&topic, &event)).await {
            tracing::warn!("Failed to publish reaction change on {}: {}", topic, e);
        }
    }
}

//! Access decisions for a caller on a chat context.
//!
//! The guard only reads. A denial stops the pipeline before anything is
//! written, published or counted.

use chat_core::store::ContextRepo;
use chat_core::types::{Actor, ChatContext, MemberRole, MemberStatus, Membership, PAIR_KEY_SEPARATOR};
use chat_core::{ChatError, ChatResult, ChatStore};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// DM participant not blocked by the other party, or JOINED group member.
    Member,
    /// OWNER or MODERATOR of the group, or platform admin.
    Moderator,
    /// OWNER of the group, or platform admin.
    Owner,
}

/// What a successful check resolved, so callers don't look it up twice.
#[derive(Debug, Clone)]
pub struct Access {
    pub actor: Actor,
    pub context: ChatContext,
    pub membership: Option<Membership>,
    pub can_moderate: bool,
}

impl Access {
    pub fn user_id(&self) -> &str {
        &self.actor.user_id
    }
}

pub fn is_participant(context: &ChatContext, user_id: &str) -> bool {
    context.is_dm() && context.is_participant(user_id)
}

pub fn is_joined_member(membership: Option<&Membership>) -> bool {
    membership.is_some_and(|m| m.status == MemberStatus::Joined)
}

pub fn is_moderator(actor: &Actor, membership: Option<&Membership>) -> bool {
    actor.is_admin()
        || (is_joined_member(membership)
            && membership.is_some_and(|m| matches!(m.role, MemberRole::Owner | MemberRole::Moderator)))
}

fn is_owner(actor: &Actor, membership: Option<&Membership>) -> bool {
    actor.is_admin()
        || (is_joined_member(membership) && membership.is_some_and(|m| m.role == MemberRole::Owner))
}

pub fn require_actor(actor: Option<&Actor>) -> ChatResult<&Actor> {
    actor.ok_or(ChatError::Unauthenticated)
}

#[derive(Clone)]
pub struct Guard {
    store: Arc<dyn ChatStore>,
}

impl Guard {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn authorize(
        &self,
        actor: Option<&Actor>,
        context_id: Uuid,
        capability: Capability,
    ) -> ChatResult<Access> {
        let actor = require_actor(actor)?;
        let context = self
            .store
            .find_context(context_id)
            .await?
            .ok_or_else(|| ChatError::not_found("chat context"))?;

        if context.is_dm() {
            self.authorize_dm(actor, context, capability).await
        } else {
            self.authorize_group(actor, context, capability).await
        }
    }

    async fn authorize_dm(
        &self,
        actor: &Actor,
        context: ChatContext,
        capability: Capability,
    ) -> ChatResult<Access> {
        // Nobody owns a DM thread; elevated actions belong to platform admins.
        if capability != Capability::Member {
            if actor.is_admin() {
                return Ok(Access { actor: actor.clone(), context, membership: None, can_moderate: true });
            }
            return Err(ChatError::forbidden("requires a platform admin"));
        }

        if !is_participant(&context, &actor.user_id) {
            return Err(ChatError::forbidden("not a participant of this thread"));
        }

        if let (Some(a), Some(b)) = (context.participant_a.as_deref(), context.participant_b.as_deref()) {
            if self.store.is_blocked_between(a, b).await? {
                return Err(ChatError::forbidden("a participant has blocked the other"));
            }
        }

        Ok(Access {
            actor: actor.clone(),
            can_moderate: actor.is_admin(),
            context,
            membership: None,
        })
    }

    async fn authorize_group(
        &self,
        actor: &Actor,
        context: ChatContext,
        capability: Capability,
    ) -> ChatResult<Access> {
        let membership = self.store.find_membership(context.id, &actor.user_id).await?;
        let m = membership.as_ref();

        let allowed = match capability {
            Capability::Member => is_joined_member(m),
            Capability::Moderator => is_moderator(actor, m),
            Capability::Owner => is_owner(actor, m),
        };

        if !allowed {
            let reason = match capability {
                Capability::Member => "not a joined member of this chat",
                Capability::Moderator => "requires moderator role",
                Capability::Owner => "requires owner role",
            };
            return Err(ChatError::forbidden(reason));
        }

        Ok(Access {
            actor: actor.clone(),
            can_moderate: is_moderator(actor, m),
            context,
            membership,
        })
    }

    /// Checks for opening a DM with `target_id`: no self-messaging, no blocks.
    pub async fn authorize_dm_target(&self, actor: Option<&Actor>, target_id: &str) -> ChatResult<()> {
        let actor = require_actor(actor)?;
        let target_id = target_id.trim();

        if target_id.is_empty() {
            return Err(ChatError::bad_input("recipient is required"));
        }
        if actor.user_id.contains(PAIR_KEY_SEPARATOR) || target_id.contains(PAIR_KEY_SEPARATOR) {
            return Err(ChatError::bad_input(format!(
                "user ids in a direct message cannot contain {:?}",
                PAIR_KEY_SEPARATOR
            )));
        }
        if actor.user_id == target_id {
            return Err(ChatError::bad_input("cannot message yourself"));
        }
        if self.store.is_blocked_between(&actor.user_id, target_id).await? {
            return Err(ChatError::forbidden("a participant has blocked the other"));
        }
        Ok(())
    }
}

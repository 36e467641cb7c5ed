#![allow(dead_code)]

use chat_core::store::{ContextRepo, InMemoryStore};
use chat_core::types::{Actor, ChatContext, MemberRole, MemberStatus, Membership};
use chat_core::{ChatSettings, InMemoryBus, InMemoryCounterStore, ManualClock};
use chat_messaging::{ChatService, FanoutMode};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<InMemoryBus>,
    pub clock: ManualClock,
    pub chat: ChatService,
}

pub fn harness() -> Harness {
    harness_with(ChatSettings::default())
}

pub fn harness_with(settings: ChatSettings) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let counters = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));

    let chat = ChatService::new(store.clone(), counters, bus.clone(), Arc::new(clock.clone()), settings)
        .with_fanout_mode(FanoutMode::Inline);

    Harness { store, bus, clock, chat }
}

pub fn user(id: &str) -> Actor {
    Actor::user(id)
}

impl Harness {
    /// A group chat where each `(user, role)` is a JOINED member.
    pub async fn group(&self, members: &[(&str, MemberRole)]) -> ChatContext {
        let context = self
            .store
            .create_group_context("event-42", self.clock_now())
            .await
            .unwrap();
        for (user_id, role) in members {
            self.set_member(context.id, user_id, MemberStatus::Joined, *role).await;
        }
        context
    }

    pub async fn set_member(&self, context_id: uuid::Uuid, user_id: &str, status: MemberStatus, role: MemberRole) {
        self.store
            .upsert_membership(&Membership {
                context_id,
                user_id: user_id.to_string(),
                status,
                role,
            })
            .await
            .unwrap();
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        use chat_core::Clock;
        self.clock.now()
    }
}

use chat_core::types::Actor;
use chat_core::{ChatEvent, EventStream};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing;
use uuid::Uuid;

use crate::guard::{Capability, Guard};

/// A live event stream that keeps re-running the guard for its context and
/// ends once the subscriber loses access (left the group, banned, blocked).
pub struct Subscription {
    events: EventStream,
    recheck: Option<Recheck>,
}

struct Recheck {
    guard: Guard,
    actor: Actor,
    context_id: Uuid,
    interval: Interval,
}

impl Subscription {
    pub fn guarded(events: EventStream, guard: Guard, actor: Actor, context_id: Uuid, every: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            events,
            recheck: Some(Recheck { guard, actor, context_id, interval }),
        }
    }

    /// A stream scoped to the caller themselves; nothing to re-check.
    pub fn unguarded(events: EventStream) -> Self {
        Self { events, recheck: None }
    }

    /// Next event, or `None` once the stream closes or access is revoked.
    pub async fn next(&mut self) -> Option<ChatEvent> {
        let Some(recheck) = self.recheck.as_mut() else {
            return self.events.next().await;
        };

        loop {
            tokio::select! {
                event = self.events.next() => return event,
                _ = recheck.interval.tick() => {
                    let result = recheck
                        .guard
                        .authorize(Some(&recheck.actor), recheck.context_id, Capability::Member)
                        .await;
                    if let Err(e) = result {
                        tracing::info!(
                            "Ending subscription of {} on {}: {}",
                            recheck.actor.user_id,
                            recheck.context_id,
                            e
                        );
                        return None;
                    }
                }
            }
        }
    }
}

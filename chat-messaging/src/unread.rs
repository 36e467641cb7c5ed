use chat_core::counter::bounded;
use chat_core::store::{MessageRepo, ReadMarkerRepo};
use chat_core::types::ReadMarker;
use chat_core::{ChatResult, ChatSettings, ChatStore, Clock, CounterStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

use crate::guard::Access;

/// `chat:unread:<contextId>:<userId>`
pub fn unread_cache_key(context_id: Uuid, user_id: &str) -> String {
    format!("chat:unread:{}:{}", context_id, user_id)
}

/// Bumped on every invalidation; cached counts are tagged with the
/// generation they were computed under.
pub fn unread_generation_key(context_id: Uuid, user_id: &str) -> String {
    format!("{}:gen", unread_cache_key(context_id, user_id))
}

const GENERATION_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

fn parse_cached(value: &str) -> Option<(u64, i64)> {
    let (generation, count) = value.split_once(':')?;
    Some((generation.parse().ok()?, count.parse().ok()?))
}

/// Read markers plus a short-lived cache of the derived unread count.
/// Cache failures never fail the caller.
#[derive(Clone)]
pub struct UnreadTracker {
    store: Arc<dyn ChatStore>,
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    settings: Arc<ChatSettings>,
}

impl UnreadTracker {
    pub fn new(
        store: Arc<dyn ChatStore>,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        settings: Arc<ChatSettings>,
    ) -> Self {
        Self { store, counters, clock, settings }
    }

    /// Move the caller's marker forward to `at` (default now, never past now).
    /// On a DM thread this also stamps read receipts on the other party's messages.
    pub async fn mark_read(&self, access: &Access, at: Option<DateTime<Utc>>) -> ChatResult<bool> {
        let now = self.clock.now();
        let at = at.map_or(now, |at| at.min(now));
        let context_id = access.context.id;
        let user_id = access.user_id();

        let last_read_at = self
            .store
            .upsert_read_marker(&ReadMarker {
                context_id,
                user_id: user_id.to_string(),
                last_read_at: at,
            })
            .await?;

        if access.context.is_dm() {
            let stamped = self.store.mark_messages_read(context_id, user_id, last_read_at).await?;
            tracing::debug!("Stamped {} read receipts in {} for {}", stamped, context_id, user_id);
        }

        self.invalidate(context_id, &[user_id.to_string()]).await;
        Ok(true)
    }

    pub async fn unread_count(&self, context_id: Uuid, user_id: &str) -> ChatResult<i64> {
        let key = unread_cache_key(context_id, user_id);
        let timeout = self.settings.aux_timeout();

        // Read before counting so a write racing an invalidation lands under
        // the old generation and is never served.
        let generation = self.generation(context_id, user_id).await;

        if let Some(generation) = generation {
            match bounded(timeout, "unread cache read", self.counters.get(&key)).await {
                Ok(Some(cached)) => match parse_cached(&cached) {
                    Some((tag, count)) if tag == generation => return Ok(count),
                    Some(_) => {}
                    None => tracing::warn!("Ignoring malformed unread cache entry {}", key),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!("Unread cache unavailable for {}: {}", key, e),
            }
        }

        let since = self
            .store
            .find_read_marker(context_id, user_id)
            .await?
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |marker| marker.last_read_at);
        let count = self.store.count_unread(context_id, user_id, since).await?;

        if let Some(generation) = generation {
            let value = format!("{}:{}", generation, count);
            let ttl = self.settings.unread_cache_ttl();
            if let Err(e) = bounded(timeout, "unread cache write", self.counters.set_ex(&key, &value, ttl)).await {
                tracing::warn!("Failed to cache unread count for {}: {}", key, e);
            }
        }

        Ok(count)
    }

    /// Retire cached counts for `user_ids`; logged and swallowed on failure.
    pub async fn invalidate(&self, context_id: Uuid, user_ids: &[String]) {
        let timeout = self.settings.aux_timeout();
        for user_id in user_ids {
            let generation_key = unread_generation_key(context_id, user_id);
            let bumped = self.counters.incr_window(&generation_key, GENERATION_TTL);
            if let Err(e) = bounded(timeout, "unread cache invalidation", bumped).await {
                tracing::warn!("Failed to bump unread generation {}: {}", generation_key, e);
            }

            let key = unread_cache_key(context_id, user_id);
            if let Err(e) = bounded(timeout, "unread cache invalidation", self.counters.del(&key)).await {
                tracing::warn!("Failed to invalidate unread cache {}: {}", key, e);
            }
        }
    }

    /// `None` when the counter store can't be read; the cache is skipped then.
    async fn generation(&self, context_id: Uuid, user_id: &str) -> Option<u64> {
        let key = unread_generation_key(context_id, user_id);
        match bounded(self.settings.aux_timeout(), "unread generation read", self.counters.get(&key)).await {
            Ok(None) => Some(0),
            Ok(Some(value)) => match value.parse() {
                Ok(generation) => Some(generation),
                Err(_) => {
                    tracing::warn!("Ignoring malformed unread generation {}", key);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Unread cache unavailable for {}: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::store::{ContextRepo, InMemoryStore, MessageRepo};
    use chat_core::types::{Actor, NewMessage};
    use chat_core::{InMemoryCounterStore, ManualClock};
    use chrono::Duration;

    #[test]
    fn cache_key_layout() {
        let ctx = Uuid::nil();
        assert_eq!(unread_cache_key(ctx, "bob"), format!("chat:unread:{}:bob", ctx));
        assert_eq!(unread_generation_key(ctx, "bob"), format!("chat:unread:{}:bob:gen", ctx));
    }

    #[test]
    fn cached_entries_carry_their_generation() {
        assert_eq!(parse_cached("3:12"), Some((3, 12)));
        assert_eq!(parse_cached("12"), None);
        assert_eq!(parse_cached("x:1"), None);
    }

    #[tokio::test]
    async fn marker_never_moves_backwards_and_stamps_receipts() {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let counters = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
        let tracker = UnreadTracker::new(
            store.clone(),
            counters,
            Arc::new(clock.clone()),
            Arc::new(ChatSettings::default()),
        );

        let context = store.get_or_create_dm_thread("alice", "bob", clock.now()).await.unwrap();
        let message = store
            .create_message(NewMessage {
                id: Uuid::new_v4(),
                context_id: context.id,
                sender_id: "alice".into(),
                content: "ping".into(),
                reply_to_id: None,
                created_at: clock.now(),
            })
            .await
            .unwrap();
        let bob = Access { actor: Actor::user("bob"), context: context.clone(), membership: None, can_moderate: false };

        assert_eq!(tracker.unread_count(context.id, "bob").await.unwrap(), 1);

        clock.advance(Duration::seconds(1));
        let marked_at = clock.now();
        tracker.mark_read(&bob, None).await.unwrap();
        tracker.mark_read(&bob, Some(marked_at - Duration::hours(1))).await.unwrap();

        let marker = store.find_read_marker(context.id, "bob").await.unwrap().unwrap();
        assert_eq!(marker.last_read_at, marked_at);
        assert_eq!(tracker.unread_count(context.id, "bob").await.unwrap(), 0);

        let stored = store.find_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.read_at, Some(marked_at));
    }

    #[tokio::test]
    async fn count_cached_before_an_invalidation_is_never_served() {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let counters = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
        let tracker = UnreadTracker::new(
            store.clone(),
            counters.clone(),
            Arc::new(clock.clone()),
            Arc::new(ChatSettings::default()),
        );
        let context = store.get_or_create_dm_thread("alice", "bob", clock.now()).await.unwrap();
        let send = |content: &str| NewMessage {
            id: Uuid::new_v4(),
            context_id: context.id,
            sender_id: "alice".into(),
            content: content.into(),
            reply_to_id: None,
            created_at: clock.now(),
        };

        store.create_message(send("one")).await.unwrap();
        assert_eq!(tracker.unread_count(context.id, "bob").await.unwrap(), 1);

        // A reader that computed "1" under generation 0 finishes its write
        // only after a new message invalidated the cache.
        clock.advance(Duration::seconds(1));
        store.create_message(send("two")).await.unwrap();
        tracker.invalidate(context.id, &["bob".to_string()]).await;
        let key = unread_cache_key(context.id, "bob");
        counters.set_ex(&key, "0:1", std::time::Duration::from_secs(30)).await.unwrap();

        assert_eq!(tracker.unread_count(context.id, "bob").await.unwrap(), 2);
        assert_eq!(counters.get(&key).await.unwrap(), Some("1:2".to_string()));
    }
}

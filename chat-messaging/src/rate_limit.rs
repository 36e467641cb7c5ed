use chat_core::counter::bounded;
use chat_core::{ChatError, ChatResult, ChatSettings, CounterStore, RateLimitRule};
use std::sync::Arc;
use std::time::Duration;
use tracing;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Send,
    Edit,
    Delete,
    React,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Send => "send",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::React => "react",
        }
    }
}

/// `rl:<action>:<actorId>[:<contextId>]`
pub fn rate_limit_key(action: Action, actor_id: &str, context_id: Option<Uuid>) -> String {
    match context_id {
        Some(ctx) => format!("rl:{}:{}:{}", action.as_str(), actor_id, ctx),
        None => format!("rl:{}:{}", action.as_str(), actor_id),
    }
}

/// Fixed-window throttle per actor and action, kept in the counter store.
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    settings: Arc<ChatSettings>,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, settings: Arc<ChatSettings>) -> Self {
        let timeout = settings.aux_timeout();
        Self { counters, settings, timeout }
    }

    fn rule(&self, action: Action) -> RateLimitRule {
        match action {
            Action::Send => self.settings.send_limit,
            Action::Edit => self.settings.edit_limit,
            Action::Delete => self.settings.delete_limit,
            Action::React => self.settings.react_limit,
        }
    }

    /// Count one hit and reject once the window's limit is passed.
    pub async fn check(&self, action: Action, actor_id: &str, context_id: Option<Uuid>) -> ChatResult<()> {
        let rule = self.rule(action);
        let key = rate_limit_key(action, actor_id, context_id);

        let hits = bounded(self.timeout, "rate limit check", self.counters.incr_window(&key, rule.window())).await;

        match hits {
            Ok(count) if count > rule.limit => {
                tracing::debug!("Rate limit hit for {} ({} > {})", key, count, rule.limit);
                Err(ChatError::RateLimited(format!(
                    "too many {} requests, limit is {} per {}s",
                    action.as_str(),
                    rule.limit,
                    rule.window_secs
                )))
            }
            Ok(_) => Ok(()),
            Err(e) if self.settings.rate_limit_fail_closed => {
                tracing::warn!("Rate limiter unavailable for {}, rejecting: {}", key, e);
                Err(ChatError::RateLimited("rate limiter unavailable".to_string()))
            }
            Err(e) => {
                tracing::warn!("Rate limiter unavailable for {}, allowing: {}", key, e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chat_core::{InMemoryCounterStore, ManualClock};
    use chrono::Utc;

    struct DownCounterStore;

    #[async_trait]
    impl CounterStore for DownCounterStore {
        async fn incr_window(&self, _key: &str, _window: Duration) -> anyhow::Result<u64> {
            Err(anyhow!("connection refused"))
        }
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow!("connection refused"))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> anyhow::Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn del(&self, _key: &str) -> anyhow::Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    fn settings(fail_closed: bool) -> Arc<ChatSettings> {
        Arc::new(ChatSettings {
            send_limit: RateLimitRule::new(2, 10),
            rate_limit_fail_closed: fail_closed,
            ..ChatSettings::default()
        })
    }

    #[test]
    fn keys_follow_the_documented_layout() {
        let ctx = Uuid::nil();
        assert_eq!(rate_limit_key(Action::Edit, "alice", None), "rl:edit:alice");
        assert_eq!(
            rate_limit_key(Action::Send, "alice", Some(ctx)),
            format!("rl:send:alice:{}", ctx)
        );
    }

    #[tokio::test]
    async fn rejects_after_limit_until_window_passes() {
        let clock = ManualClock::new(Utc::now());
        let counters = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
        let limiter = RateLimiter::new(counters, settings(false));
        let ctx = Some(Uuid::new_v4());

        limiter.check(Action::Send, "alice", ctx).await.unwrap();
        limiter.check(Action::Send, "alice", ctx).await.unwrap();
        assert!(matches!(
            limiter.check(Action::Send, "alice", ctx).await,
            Err(ChatError::RateLimited(_))
        ));
        // Other actors have their own window
        limiter.check(Action::Send, "bob", ctx).await.unwrap();

        clock.advance(chrono::Duration::seconds(11));
        limiter.check(Action::Send, "alice", ctx).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_store_fails_open_by_default() {
        let limiter = RateLimiter::new(Arc::new(DownCounterStore), settings(false));
        assert!(limiter.check(Action::Send, "alice", None).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_store_can_fail_closed() {
        let limiter = RateLimiter::new(Arc::new(DownCounterStore), settings(true));
        assert!(matches!(
            limiter.check(Action::Send, "alice", None).await,
            Err(ChatError::RateLimited(_))
        ));
    }
}

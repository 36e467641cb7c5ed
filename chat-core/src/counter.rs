//! TTL-aware counter/cache store used for rate limiting and unread caching.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::redis::{get_connection, RedisPool};

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, starting a `window`-long TTL on the first hit. Returns the new count.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;
}

/// Run an auxiliary call under a deadline; a timeout becomes an ordinary error.
pub async fn bounded<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{} timed out after {:?}", what, timeout)),
    }
}

pub struct RedisCounterStore {
    pool: RedisPool,
}

impl RedisCounterStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

/// `SET key 0 EX <window> NX` then `INCR key` in one MULTI/EXEC, so a counter
/// never exists without its expiry.
pub fn window_pipeline(key: &str, window: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window.as_secs().max(1))
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key);
    pipe
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = get_connection(&self.pool);
        let (count,): (u64,) = window_pipeline(key, window).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool);
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = get_connection(&self.pool);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool);
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Single-process counter store whose expiry follows the injected clock.
pub struct InMemoryCounterStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, entries: Mutex::new(HashMap::new()) }
    }

    fn expiry(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl)?;
        Ok(self.clock.now() + ttl)
    }

    fn with_live_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
        f(&mut entries)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64> {
        let expires_at = self.expiry(window)?;
        self.with_live_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: Some(expires_at),
            });
            let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
            entry.value = count.to_string();
            Ok(count)
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_live_entries(|entries| entries.get(key).map(|e| e.value.clone())))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = self.expiry(ttl)?;
        self.with_live_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry { value: value.to_string(), expires_at: Some(expires_at) },
            );
        });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.with_live_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }
}

use anyhow::{anyhow, Result};
use redis::aio::{ConnectionManager, PubSub};
use redis::Client;
use tracing;

use crate::config::RedisConfig;

pub type RedisConnection = ConnectionManager;

/// Shared Redis handles: one reconnecting multiplexed connection for commands,
/// plus the client that opens dedicated pub/sub connections.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    manager: ConnectionManager,
}

/// Open the shared Redis client backing rate limits, unread caching and pub/sub.
pub async fn create_pool(config: &RedisConfig) -> Result<RedisPool> {
    tracing::info!("Connecting to Redis at {}", mask_redis_url(&config.url));

    let client = Client::open(config.url.as_str())
        .map_err(|e| anyhow!("Failed to create Redis client: {}", e))?;

    let mut manager = ConnectionManager::new(client.clone())
        .await
        .map_err(|e| anyhow!("Failed to connect to Redis: {}", e))?;

    redis::cmd("PING")
        .query_async::<String>(&mut manager)
        .await
        .map_err(|e| anyhow!("Failed to ping Redis: {}", e))?;

    tracing::info!("Redis connection established");

    Ok(RedisPool { client, manager })
}

/// A handle onto the shared connection. Cloning it opens nothing.
pub fn get_connection(pool: &RedisPool) -> RedisConnection {
    pool.manager.clone()
}

/// Pub/sub needs a dedicated connection; it cannot share the multiplexed one.
pub async fn get_pubsub(pool: &RedisPool) -> Result<PubSub> {
    pool.client
        .get_async_pubsub()
        .await
        .map_err(|e| anyhow!("Failed to open Redis pub/sub connection: {}", e))
}

pub fn mask_redis_url(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((credentials, host)) => match credentials.rfind(':') {
            Some(colon) if colon > "redis://".len() => {
                format!("{}:****@{}", &credentials[..colon], host)
            }
            _ => format!("redis://****@{}", host),
        },
        None => url.to_string(),
    }
}

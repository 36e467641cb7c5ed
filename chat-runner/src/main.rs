use anyhow::Result;
use chat_api::{run as run_api, ApiState};
use chat_core::config::BroadcastBackend;
use chat_core::store::PgStore;
use chat_core::{AppContext, Broadcaster, Config, InMemoryBus, RedisBus, RedisCounterStore, SystemClock};
use chat_messaging::ChatService;
use std::sync::Arc;
use tokio;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting chat server");

    let config = Config::from_env();
    let ctx = AppContext::new(config).await?;

    tracing::info!("Chat context initialized");

    let store = Arc::new(PgStore::new(
        ctx.db_pool.clone(),
        ctx.config.server.encryption_key.clone(),
    ));
    let counters = Arc::new(RedisCounterStore::new(ctx.redis_pool.clone()));

    let bus: Arc<dyn Broadcaster> = match ctx.config.chat.broadcast_backend {
        BroadcastBackend::Redis => Arc::new(RedisBus::new(ctx.redis_pool.clone())),
        BroadcastBackend::Memory => {
            tracing::warn!("Using in-process broadcast; live events will not cross instances");
            Arc::new(InMemoryBus::new())
        }
    };

    let chat = ChatService::new(
        store,
        counters,
        bus,
        Arc::new(SystemClock),
        ctx.config.chat.clone(),
    );
    let state = ApiState::new(chat, ctx.config.server.jwt_secret.as_str());

    tokio::select! {
        result = run_api(state, &ctx.config.server) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
    }

    Ok(())
}

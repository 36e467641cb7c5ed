pub mod bus;
pub mod clock;
pub mod config;
pub mod context;
pub mod counter;
pub mod cursor;
pub mod db;
pub mod encryption;
pub mod error;
pub mod redis;
pub mod schema;
pub mod store;
pub mod types;

pub use bus::{Broadcaster, ChatEvent, EventStream, InMemoryBus, RedisBus, Topic};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChatSettings, Config, RateLimitRule};
pub use context::AppContext;
pub use counter::{CounterStore, InMemoryCounterStore, RedisCounterStore};
pub use cursor::{Cursor, CursorKey};
pub use db::DbPool;
pub use encryption::{decrypt_content, encrypt_content};
pub use error::{ChatError, ChatResult};
pub use redis::RedisPool;
pub use store::ChatStore;

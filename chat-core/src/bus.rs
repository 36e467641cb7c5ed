//! Topic-scoped publish/subscribe for live chat events.
//!
//! Delivery is at-most-once and unordered relative to the persisted write.
//! A subscriber that falls behind an in-memory channel skips the lagged events.
//!
//! Topics are `<event-name>:<contextId-or-recipientId>`:
//!
//! | event name           | scoped by    |
//! |----------------------|--------------|
//! | `message-added`      | context      |
//! | `message-edited`     | context      |
//! | `message-deleted`    | context      |
//! | `typing`             | context      |
//! | `reaction-changed`   | context      |
//! | `notification-added` | recipient    |

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::redis::{get_connection, get_pubsub, RedisPool};
use crate::types::{Message, Notification, ReactionAction};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    fn scoped(event: &str, scope: impl fmt::Display) -> Self {
        Topic(format!("{}:{}", event, scope))
    }

    pub fn message_added(context_id: Uuid) -> Self {
        Self::scoped("message-added", context_id)
    }

    pub fn message_edited(context_id: Uuid) -> Self {
        Self::scoped("message-edited", context_id)
    }

    pub fn message_deleted(context_id: Uuid) -> Self {
        Self::scoped("message-deleted", context_id)
    }

    /// The three lifecycle topics a message subscriber listens to.
    pub fn messages(context_id: Uuid) -> [Self; 3] {
        [
            Self::message_added(context_id),
            Self::message_edited(context_id),
            Self::message_deleted(context_id),
        ]
    }

    pub fn typing(context_id: Uuid) -> Self {
        Self::scoped("typing", context_id)
    }

    pub fn reactions(context_id: Uuid) -> Self {
        Self::scoped("reaction-changed", context_id)
    }

    pub fn notifications(recipient_id: &str) -> Self {
        Self::scoped("notification-added", recipient_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload carried on every topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    MessageAdded {
        message: Message,
    },
    MessageEdited {
        message: Message,
    },
    MessageDeleted {
        context_id: Uuid,
        message_id: Uuid,
        deleted_at: DateTime<Utc>,
        hard: bool,
    },
    ReactionChanged {
        context_id: Uuid,
        message_id: Uuid,
        user_id: String,
        emoji: String,
        action: ReactionAction,
    },
    TypingChanged {
        context_id: Uuid,
        user_id: String,
        is_typing: bool,
    },
    NotificationAdded {
        notification: Notification,
    },
}

pub type EventStream = BoxStream<'static, ChatEvent>;

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, topic: &Topic, event: &ChatEvent) -> Result<()>;

    async fn subscribe(&self, topic: &Topic) -> Result<EventStream>;

    /// Merge several topics into one stream.
    async fn subscribe_all(&self, topics: &[Topic]) -> Result<EventStream> {
        let mut streams = Vec::with_capacity(topics.len());
        for topic in topics {
            streams.push(self.subscribe(topic).await?);
        }
        Ok(stream::select_all(streams).boxed())
    }
}

/// In-process hub keyed by topic; channels are created on first subscribe.
#[derive(Clone)]
pub struct InMemoryBus {
    channels: Arc<RwLock<HashMap<Topic, broadcast::Sender<ChatEvent>>>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Channels whose subscribers all went away.
    fn prune(channels: &mut HashMap<Topic, broadcast::Sender<ChatEvent>>) {
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for InMemoryBus {
    async fn publish(&self, topic: &Topic, event: &ChatEvent) -> Result<()> {
        let delivered = {
            let channels = self.channels.read().await;
            match channels.get(topic) {
                Some(tx) => tx.send(event.clone()).is_ok(),
                None => return Ok(()),
            }
        };

        // No receivers is not an error, but the channel is dead weight now
        if !delivered {
            let mut channels = self.channels.write().await;
            if channels.get(topic).is_some_and(|tx| tx.receiver_count() == 0) {
                channels.remove(topic);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<EventStream> {
        let rx = {
            let mut channels = self.channels.write().await;
            Self::prune(&mut channels);
            channels
                .entry(topic.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let topic = topic.clone();
        let events = stream::unfold((rx, topic), |(mut rx, topic)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, (rx, topic))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscriber on {} lagged, skipped {} events", topic, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(events.boxed())
    }
}

/// Redis PUBLISH/SUBSCRIBE transport; payloads are JSON-encoded `ChatEvent`s.
#[derive(Clone)]
pub struct RedisBus {
    pool: RedisPool,
}

impl RedisBus {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broadcaster for RedisBus {
    async fn publish(&self, topic: &Topic, event: &ChatEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = get_connection(&self.pool);

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(topic.as_str())
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        tracing::debug!("Published to {} ({} receivers)", topic, receivers);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<EventStream> {
        self.subscribe_all(std::slice::from_ref(topic)).await
    }

    /// All topics share one pub/sub connection.
    async fn subscribe_all(&self, topics: &[Topic]) -> Result<EventStream> {
        let mut pubsub = get_pubsub(&self.pool).await?;
        for topic in topics {
            pubsub.subscribe(topic.as_str()).await?;
        }

        let events = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Dropping non-text payload on {}: {}", msg.get_channel_name(), e);
                    return None;
                }
            };
            match serde_json::from_str::<ChatEvent>(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Dropping malformed event on {}: {}", msg.get_channel_name(), e);
                    None
                }
            }
        });

        Ok(events.boxed())
    }
}

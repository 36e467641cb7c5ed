//! Opaque pagination cursors over the `(created_at, id)` ordering key.
//!
//! A cursor names the last row a client has seen rather than an offset, so a
//! page boundary stays put while messages are inserted or deleted around it.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const VERSION_PREFIX: &str = "m1";

/// Composite ordering key of a message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CursorKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl CursorKey {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }
}

pub struct Cursor;

impl Cursor {
    pub fn encode(key: CursorKey) -> String {
        let raw = format!(
            "{}:{}:{}",
            VERSION_PREFIX,
            key.created_at.timestamp_micros(),
            key.id.simple()
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(cursor: &str) -> Result<CursorKey> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.trim())
            .context("Invalid cursor: not valid base64")?;
        let raw = String::from_utf8(bytes).context("Invalid cursor: not UTF-8")?;

        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(VERSION_PREFIX), Some(micros), Some(id)) => {
                let micros: i64 = micros.parse().context("Invalid cursor: bad timestamp")?;
                let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
                    .ok_or_else(|| anyhow!("Invalid cursor: timestamp out of range"))?;
                let id = Uuid::parse_str(id).context("Invalid cursor: bad id")?;
                Ok(CursorKey { created_at, id })
            }
            _ => Err(anyhow!("Invalid cursor: unrecognized layout")),
        }
    }
}

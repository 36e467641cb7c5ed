use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Timestamptz};
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{ContextRepo, MessageRepo, MuteRepo, NotificationRepo, ReactionRepo, ReadMarkerRepo};
use crate::cursor::CursorKey;
use crate::db::{retry_once, DbPool};
use crate::encryption::{decrypt_content, encrypt_content};
use crate::schema::{
    chat_contexts, chat_members, chat_messages, chat_mutes, chat_notifications, chat_reactions,
    chat_read_markers, chat_user_blocks,
};
use crate::types::{
    pair_key, ChatContext, ContextKind, MemberStatus, Membership, Message, NewMessage,
    NewNotification, Notification, Reaction, ReadMarker,
};

diesel::define_sql_function!(fn greatest(a: Timestamptz, b: Timestamptz) -> Timestamptz);

/// Rows strictly older than `key` in `(created_at DESC, id DESC)` order.
fn older_than(key: CursorKey) -> Box<dyn BoxableExpression<chat_messages::table, Pg, SqlType = Bool>> {
    Box::new(
        chat_messages::created_at
            .lt(key.created_at)
            .or(chat_messages::created_at.eq(key.created_at).and(chat_messages::id.lt(key.id))),
    )
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = chat_contexts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ContextRow {
    id: Uuid,
    kind: String,
    pair_key: Option<String>,
    participant_a: Option<String>,
    participant_b: Option<String>,
    event_id: Option<String>,
    message_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContextRow> for ChatContext {
    type Error = anyhow::Error;

    fn try_from(row: ContextRow) -> Result<Self> {
        Ok(ChatContext {
            id: row.id,
            kind: row.kind.parse()?,
            pair_key: row.pair_key,
            participant_a: row.participant_a,
            participant_b: row.participant_b,
            event_id: row.event_id,
            message_count: row.message_count,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = chat_members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MemberRow {
    context_id: Uuid,
    user_id: String,
    status: String,
    role: String,
}

impl TryFrom<MemberRow> for Membership {
    type Error = anyhow::Error;

    fn try_from(row: MemberRow) -> Result<Self> {
        Ok(Membership {
            context_id: row.context_id,
            user_id: row.user_id,
            status: row.status.parse()?,
            role: row.role.parse()?,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MessageRow {
    id: Uuid,
    context_id: Uuid,
    sender_id: String,
    content: Vec<u8>,
    reply_to_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = chat_reactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ReactionRow {
    message_id: Uuid,
    user_id: String,
    emoji: String,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = chat_notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct NotificationRow {
    id: Uuid,
    recipient_id: String,
    actor_id: String,
    kind: String,
    entity_id: Uuid,
    context_id: Uuid,
    dedupe_key: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            actor_id: row.actor_id,
            kind: row.kind.parse()?,
            entity_id: row.entity_id,
            context_id: row.context_id,
            dedupe_key: row.dedupe_key,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = chat_notifications)]
struct NotificationInsert<'a> {
    id: Uuid,
    recipient_id: &'a str,
    actor_id: &'a str,
    kind: &'a str,
    entity_id: Uuid,
    context_id: Uuid,
    dedupe_key: &'a str,
    created_at: DateTime<Utc>,
}

/// Postgres-backed store. Message content is sealed per context before it
/// reaches the database and opened again on the way out.
pub struct PgStore {
    pool: Arc<DbPool>,
    encryption_key: String,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>, encryption_key: String) -> Self {
        Self { pool, encryption_key }
    }

    fn open(&self, row: MessageRow) -> Result<Message> {
        let content = decrypt_content(&row.content, row.context_id, &self.encryption_key)?;
        Ok(Message {
            id: row.id,
            context_id: row.context_id,
            sender_id: row.sender_id,
            content,
            reply_to_id: row.reply_to_id,
            created_at: row.created_at,
            edited_at: row.edited_at,
            deleted_at: row.deleted_at,
            read_at: row.read_at,
        })
    }

    async fn insert_message(&self, new: &NewMessage, sealed: &[u8]) -> Result<MessageRow> {
        let mut conn = self.pool.get().await?;
        let row = conn
            .transaction::<_, diesel::result::Error, _>(move |conn| {
                async move { insert_message_tx(conn, new, sealed).await }.scope_boxed()
            })
            .await?;
        Ok(row)
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let deleted = conn
            .transaction::<_, diesel::result::Error, _>(move |conn| {
                async move { hard_delete_tx(conn, id).await }.scope_boxed()
            })
            .await?;
        Ok(deleted)
    }
}

async fn insert_message_tx(
    conn: &mut AsyncPgConnection,
    new: &NewMessage,
    sealed: &[u8],
) -> QueryResult<MessageRow> {
    let row = diesel::insert_into(chat_messages::table)
        .values((
            chat_messages::id.eq(new.id),
            chat_messages::context_id.eq(new.context_id),
            chat_messages::sender_id.eq(&new.sender_id),
            chat_messages::content.eq(sealed),
            chat_messages::reply_to_id.eq(new.reply_to_id),
            chat_messages::created_at.eq(new.created_at),
        ))
        .returning(MessageRow::as_returning())
        .get_result(conn)
        .await?;

    diesel::update(chat_contexts::table.find(new.context_id))
        .set(chat_contexts::message_count.eq(chat_contexts::message_count + 1))
        .execute(conn)
        .await?;

    Ok(row)
}

async fn hard_delete_tx(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<bool> {
    // Reactions cascade and replies fall back to NULL through the foreign keys.
    let context_id: Option<Uuid> = diesel::delete(chat_messages::table.find(id))
        .returning(chat_messages::context_id)
        .get_result(conn)
        .await
        .optional()?;

    let Some(context_id) = context_id else {
        return Ok(false);
    };

    diesel::update(chat_contexts::table.find(context_id))
        .set(chat_contexts::message_count.eq(chat_contexts::message_count - 1))
        .execute(conn)
        .await?;

    Ok(true)
}

#[async_trait]
impl ContextRepo for PgStore {
    async fn find_context(&self, id: Uuid) -> Result<Option<ChatContext>> {
        let mut conn = self.pool.get().await?;
        chat_contexts::table
            .find(id)
            .select(ContextRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(ChatContext::try_from)
            .transpose()
    }

    async fn get_or_create_dm_thread(
        &self,
        user_a: &str,
        user_b: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatContext> {
        let key = pair_key(user_a, user_b);
        let (low, high) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
        let mut conn = self.pool.get().await?;

        // Concurrent creators race on the unique pair key; the loser reads the winner's row.
        diesel::insert_into(chat_contexts::table)
            .values((
                chat_contexts::id.eq(Uuid::new_v4()),
                chat_contexts::kind.eq(ContextKind::Dm.as_str()),
                chat_contexts::pair_key.eq(&key),
                chat_contexts::participant_a.eq(low),
                chat_contexts::participant_b.eq(high),
                chat_contexts::created_at.eq(now),
            ))
            .on_conflict(chat_contexts::pair_key)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        let row = chat_contexts::table
            .filter(chat_contexts::pair_key.eq(&key))
            .select(ContextRow::as_select())
            .first(&mut conn)
            .await?;
        row.try_into()
    }

    async fn create_group_context(&self, event_id: &str, now: DateTime<Utc>) -> Result<ChatContext> {
        let mut conn = self.pool.get().await?;
        let row = diesel::insert_into(chat_contexts::table)
            .values((
                chat_contexts::id.eq(Uuid::new_v4()),
                chat_contexts::kind.eq(ContextKind::Group.as_str()),
                chat_contexts::event_id.eq(event_id),
                chat_contexts::created_at.eq(now),
            ))
            .returning(ContextRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn find_membership(&self, context_id: Uuid, user_id: &str) -> Result<Option<Membership>> {
        let mut conn = self.pool.get().await?;
        chat_members::table
            .find((context_id, user_id))
            .select(MemberRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Membership::try_from)
            .transpose()
    }

    async fn upsert_membership(&self, membership: &Membership) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(chat_members::table)
            .values((
                chat_members::context_id.eq(membership.context_id),
                chat_members::user_id.eq(&membership.user_id),
                chat_members::status.eq(membership.status.as_str()),
                chat_members::role.eq(membership.role.as_str()),
            ))
            .on_conflict((chat_members::context_id, chat_members::user_id))
            .do_update()
            .set((
                chat_members::status.eq(membership.status.as_str()),
                chat_members::role.eq(membership.role.as_str()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn joined_member_ids(&self, context_id: Uuid) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let ids = chat_members::table
            .filter(chat_members::context_id.eq(context_id))
            .filter(chat_members::status.eq(MemberStatus::Joined.as_str()))
            .select(chat_members::user_id)
            .order(chat_members::user_id.asc())
            .load(&mut conn)
            .await?;
        Ok(ids)
    }

    async fn is_blocked_between(&self, user_a: &str, user_b: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let blocked = diesel::select(diesel::dsl::exists(
            chat_user_blocks::table.filter(
                chat_user_blocks::blocker_id
                    .eq(user_a)
                    .and(chat_user_blocks::blocked_id.eq(user_b))
                    .or(chat_user_blocks::blocker_id
                        .eq(user_b)
                        .and(chat_user_blocks::blocked_id.eq(user_a))),
            ),
        ))
        .get_result(&mut conn)
        .await?;
        Ok(blocked)
    }

    async fn set_block(&self, blocker_id: &str, blocked_id: &str, blocked: bool) -> Result<()> {
        let mut conn = self.pool.get().await?;
        if blocked {
            diesel::insert_into(chat_user_blocks::table)
                .values((
                    chat_user_blocks::blocker_id.eq(blocker_id),
                    chat_user_blocks::blocked_id.eq(blocked_id),
                ))
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .await?;
        } else {
            diesel::delete(chat_user_blocks::table.find((blocker_id, blocked_id)))
                .execute(&mut conn)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepo for PgStore {
    async fn find_message(&self, id: Uuid) -> Result<Option<Message>> {
        let mut conn = self.pool.get().await?;
        chat_messages::table
            .find(id)
            .select(MessageRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(|row| self.open(row))
            .transpose()
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let sealed = encrypt_content(&new.content, new.context_id, &self.encryption_key)?;
        let row = retry_once("create_message", || self.insert_message(&new, &sealed)).await?;
        self.open(row)
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        let Some(context_id) = self.find_message(id).await?.map(|m| m.context_id) else {
            return Ok(None);
        };
        let sealed = encrypt_content(content, context_id, &self.encryption_key)?;

        let mut conn = self.pool.get().await?;
        diesel::update(
            chat_messages::table
                .find(id)
                .filter(chat_messages::deleted_at.is_null()),
        )
        .set((
            chat_messages::content.eq(&sealed),
            chat_messages::edited_at.eq(Some(edited_at)),
        ))
        .returning(MessageRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?
        .map(|row| self.open(row))
        .transpose()
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            chat_messages::table
                .find(id)
                .filter(chat_messages::deleted_at.is_null()),
        )
        .set(chat_messages::deleted_at.eq(Some(at)))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }

    async fn hard_delete(&self, id: Uuid) -> Result<bool> {
        retry_once("hard_delete", || self.delete_message(id)).await
    }

    async fn list_page(
        &self,
        context_id: Uuid,
        after: Option<CursorKey>,
        fetch: i64,
    ) -> Result<Vec<Message>> {
        let mut conn = self.pool.get().await?;
        let mut query = chat_messages::table
            .filter(chat_messages::context_id.eq(context_id))
            .select(MessageRow::as_select())
            .order((chat_messages::created_at.desc(), chat_messages::id.desc()))
            .limit(fetch)
            .into_boxed();

        if let Some(key) = after {
            query = query.filter(older_than(key));
        }

        let rows = query.load(&mut conn).await?;
        rows.into_iter().map(|row| self.open(row)).collect()
    }

    async fn count_unread(&self, context_id: Uuid, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let count = chat_messages::table
            .filter(chat_messages::context_id.eq(context_id))
            .filter(chat_messages::sender_id.ne(user_id))
            .filter(chat_messages::deleted_at.is_null())
            .filter(chat_messages::created_at.gt(since))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    async fn mark_messages_read(
        &self,
        context_id: Uuid,
        reader_id: &str,
        up_to: DateTime<Utc>,
    ) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        let stamped = diesel::update(
            chat_messages::table
                .filter(chat_messages::context_id.eq(context_id))
                .filter(chat_messages::sender_id.ne(reader_id))
                .filter(chat_messages::read_at.is_null())
                .filter(chat_messages::created_at.le(up_to)),
        )
        .set(chat_messages::read_at.eq(Some(up_to)))
        .execute(&mut conn)
        .await?;
        Ok(stamped as u64)
    }
}

#[async_trait]
impl MuteRepo for PgStore {
    async fn set_mute(&self, context_id: Uuid, user_id: &str, muted: bool, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(chat_mutes::table)
            .values((
                chat_mutes::context_id.eq(context_id),
                chat_mutes::user_id.eq(user_id),
                chat_mutes::muted.eq(muted),
                chat_mutes::updated_at.eq(at),
            ))
            .on_conflict((chat_mutes::context_id, chat_mutes::user_id))
            .do_update()
            .set((chat_mutes::muted.eq(muted), chat_mutes::updated_at.eq(at)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn muted_user_ids(&self, context_id: Uuid) -> Result<HashSet<String>> {
        let mut conn = self.pool.get().await?;
        let ids: Vec<String> = chat_mutes::table
            .filter(chat_mutes::context_id.eq(context_id))
            .filter(chat_mutes::muted.eq(true))
            .select(chat_mutes::user_id)
            .load(&mut conn)
            .await?;
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl ReadMarkerRepo for PgStore {
    async fn find_read_marker(&self, context_id: Uuid, user_id: &str) -> Result<Option<ReadMarker>> {
        let mut conn = self.pool.get().await?;
        let last_read_at: Option<DateTime<Utc>> = chat_read_markers::table
            .find((context_id, user_id))
            .select(chat_read_markers::last_read_at)
            .first(&mut conn)
            .await
            .optional()?;

        Ok(last_read_at.map(|last_read_at| ReadMarker {
            context_id,
            user_id: user_id.to_string(),
            last_read_at,
        }))
    }

    async fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<DateTime<Utc>> {
        let mut conn = self.pool.get().await?;
        let last_read_at = diesel::insert_into(chat_read_markers::table)
            .values((
                chat_read_markers::context_id.eq(marker.context_id),
                chat_read_markers::user_id.eq(&marker.user_id),
                chat_read_markers::last_read_at.eq(marker.last_read_at),
            ))
            .on_conflict((chat_read_markers::context_id, chat_read_markers::user_id))
            .do_update()
            .set(chat_read_markers::last_read_at.eq(greatest(
                chat_read_markers::last_read_at,
                excluded(chat_read_markers::last_read_at),
            )))
            .returning(chat_read_markers::last_read_at)
            .get_result(&mut conn)
            .await?;
        Ok(last_read_at)
    }
}

#[async_trait]
impl ReactionRepo for PgStore {
    async fn add_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let inserted = diesel::insert_into(chat_reactions::table)
            .values((
                chat_reactions::message_id.eq(message_id),
                chat_reactions::user_id.eq(user_id),
                chat_reactions::emoji.eq(emoji),
                chat_reactions::created_at.eq(at),
            ))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted == 1)
    }

    async fn remove_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let removed = diesel::delete(chat_reactions::table.find((message_id, user_id, emoji)))
            .execute(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn list_reactions(&self, message_id: Uuid) -> Result<Vec<Reaction>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<ReactionRow> = chat_reactions::table
            .filter(chat_reactions::message_id.eq(message_id))
            .select(ReactionRow::as_select())
            .order((chat_reactions::created_at.asc(), chat_reactions::user_id.asc()))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Reaction {
                message_id: row.message_id,
                user_id: row.user_id,
                emoji: row.emoji,
                created_at: row.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl NotificationRepo for PgStore {
    async fn insert_notifications(&self, rows: Vec<NewNotification>) -> Result<Vec<Notification>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<NotificationInsert<'_>> = rows
            .iter()
            .map(|n| NotificationInsert {
                id: n.id,
                recipient_id: &n.recipient_id,
                actor_id: &n.actor_id,
                kind: n.kind.as_str(),
                entity_id: n.entity_id,
                context_id: n.context_id,
                dedupe_key: &n.dedupe_key,
                created_at: n.created_at,
            })
            .collect();

        let mut conn = self.pool.get().await?;
        let inserted: Vec<NotificationRow> = diesel::insert_into(chat_notifications::table)
            .values(&values)
            .on_conflict(chat_notifications::dedupe_key)
            .do_nothing()
            .returning(NotificationRow::as_returning())
            .get_results(&mut conn)
            .await?;

        inserted.into_iter().map(Notification::try_from).collect()
    }

    async fn list_notifications(&self, recipient_id: &str, limit: i64) -> Result<Vec<Notification>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<NotificationRow> = chat_notifications::table
            .filter(chat_notifications::recipient_id.eq(recipient_id))
            .select(NotificationRow::as_select())
            .order((chat_notifications::created_at.desc(), chat_notifications::id.desc()))
            .limit(limit)
            .load(&mut conn)
            .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        let mut conn = self.pool.get().await?;
        chat_notifications::table
            .find(id)
            .select(NotificationRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Notification::try_from)
            .transpose()
    }

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            chat_notifications::table
                .find(id)
                .filter(chat_notifications::read_at.is_null()),
        )
        .set(chat_notifications::read_at.eq(Some(at)))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_rows_reject_unknown_kinds() {
        let row = ContextRow {
            id: Uuid::new_v4(),
            kind: "channel".into(),
            pair_key: None,
            participant_a: None,
            participant_b: None,
            event_id: None,
            message_count: 0,
            created_at: Utc::now(),
        };
        assert!(ChatContext::try_from(row).is_err());
    }

    #[test]
    fn member_rows_parse_status_and_role() {
        let row = MemberRow {
            context_id: Uuid::new_v4(),
            user_id: "carol".into(),
            status: "JOINED".into(),
            role: "MODERATOR".into(),
        };
        let membership = Membership::try_from(row).unwrap();
        assert_eq!(membership.status, MemberStatus::Joined);
        assert_eq!(membership.role, crate::types::MemberRole::Moderator);
    }

    #[test]
    fn notification_rows_map_kind() {
        let row = NotificationRow {
            id: Uuid::new_v4(),
            recipient_id: "bob".into(),
            actor_id: "alice".into(),
            kind: "group_message".into(),
            entity_id: Uuid::new_v4(),
            context_id: Uuid::new_v4(),
            dedupe_key: "group_message:bob:x".into(),
            created_at: Utc::now(),
            read_at: None,
        };
        let notification = Notification::try_from(row).unwrap();
        assert_eq!(notification.kind, crate::types::NotificationKind::GroupMessage);
    }

    #[test]
    fn unknown_status_is_an_error() {
        let row = MemberRow {
            context_id: Uuid::new_v4(),
            user_id: "dave".into(),
            status: "GHOST".into(),
            role: "MEMBER".into(),
        };
        assert!(Membership::try_from(row).is_err());
    }

    #[test]
    fn keyset_predicate_breaks_timestamp_ties_on_id() {
        let key = CursorKey {
            created_at: Utc::now(),
            id: Uuid::new_v4(),
        };
        let query = chat_messages::table
            .select(chat_messages::id)
            .filter(older_than(key));
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();

        assert!(sql.contains(r#""chat_messages"."created_at" < $1"#), "{}", sql);
        assert!(sql.contains(" OR "), "{}", sql);
        assert!(sql.contains(r#""chat_messages"."created_at" = $2"#), "{}", sql);
        assert!(sql.contains(r#""chat_messages"."id" < $3"#), "{}", sql);
        assert!(sql.contains(&key.id.to_string()), "{}", sql);
    }
}

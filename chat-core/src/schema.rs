use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    chat_contexts (id) {
        id -> Uuid,
        kind -> Text,
        pair_key -> Nullable<Text>,
        participant_a -> Nullable<Text>,
        participant_b -> Nullable<Text>,
        event_id -> Nullable<Text>,
        message_count -> BigInt,
        created_at -> Timestamptz,
    }
}

table! {
    chat_members (context_id, user_id) {
        context_id -> Uuid,
        user_id -> Text,
        status -> Text,
        role -> Text,
        joined_at -> Timestamptz,
    }
}

table! {
    chat_user_blocks (blocker_id, blocked_id) {
        blocker_id -> Text,
        blocked_id -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    chat_messages (id) {
        id -> Uuid,
        context_id -> Uuid,
        sender_id -> Text,
        content -> Bytea,
        reply_to_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        edited_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
        read_at -> Nullable<Timestamptz>,
    }
}

table! {
    chat_mutes (context_id, user_id) {
        context_id -> Uuid,
        user_id -> Text,
        muted -> Bool,
        updated_at -> Timestamptz,
    }
}

table! {
    chat_read_markers (context_id, user_id) {
        context_id -> Uuid,
        user_id -> Text,
        last_read_at -> Timestamptz,
    }
}

table! {
    chat_reactions (message_id, user_id, emoji) {
        message_id -> Uuid,
        user_id -> Text,
        emoji -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    chat_notifications (id) {
        id -> Uuid,
        recipient_id -> Text,
        actor_id -> Text,
        kind -> Text,
        entity_id -> Uuid,
        context_id -> Uuid,
        dedupe_key -> Text,
        created_at -> Timestamptz,
        read_at -> Nullable<Timestamptz>,
    }
}

joinable!(chat_members -> chat_contexts (context_id));
joinable!(chat_messages -> chat_contexts (context_id));
joinable!(chat_reactions -> chat_messages (message_id));

allow_tables_to_appear_in_same_query!(
    chat_contexts,
    chat_members,
    chat_user_blocks,
    chat_messages,
    chat_mutes,
    chat_read_markers,
    chat_reactions,
    chat_notifications,
);

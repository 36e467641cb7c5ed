mod common;

use chat_core::store::{ContextRepo, MessageRepo, ReactionRepo};
use chat_core::types::{MemberRole, MemberStatus};
use chat_core::{ChatError, ChatSettings, RateLimitRule};
use chrono::Duration;
use common::{harness, harness_with, user};
use std::collections::HashSet;

#[tokio::test]
async fn dm_thread_is_the_same_from_both_sides() {
    let h = harness();
    let from_alice = h.chat.get_or_create_dm_thread(Some(&user("alice")), "bob").await.unwrap();
    let from_bob = h.chat.get_or_create_dm_thread(Some(&user("bob")), "alice").await.unwrap();

    assert_eq!(from_alice.id, from_bob.id);
    assert_eq!(from_alice.pair_key.as_deref(), Some("alice|bob"));
}

#[tokio::test]
async fn dm_thread_rejects_self_and_anonymous_callers() {
    let h = harness();
    assert!(matches!(
        h.chat.get_or_create_dm_thread(Some(&user("alice")), "alice").await,
        Err(ChatError::BadUserInput(_))
    ));
    assert!(matches!(
        h.chat.get_or_create_dm_thread(None, "alice").await,
        Err(ChatError::Unauthenticated)
    ));
}

#[tokio::test]
async fn ids_containing_the_pair_separator_cannot_alias_another_thread() {
    let h = harness();
    let existing = h.chat.get_or_create_dm_thread(Some(&user("a")), "c").await.unwrap();

    assert!(matches!(
        h.chat.get_or_create_dm_thread(Some(&user("a|b")), "c").await,
        Err(ChatError::BadUserInput(_))
    ));
    assert!(matches!(
        h.chat.get_or_create_dm_thread(Some(&user("a")), "b|c").await,
        Err(ChatError::BadUserInput(_))
    ));
    assert!(matches!(
        h.chat.send_direct_message(Some(&user("a")), "b|c", "hi", None).await,
        Err(ChatError::BadUserInput(_))
    ));

    let again = h.chat.get_or_create_dm_thread(Some(&user("c")), "a").await.unwrap();
    assert_eq!(again.id, existing.id);
    assert_eq!(h.store.find_context(existing.id).await.unwrap().unwrap().message_count, 0);
}

#[tokio::test]
async fn content_length_boundaries() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    assert!(matches!(
        h.chat.send_message(Some(&alice), thread.id, "", None).await,
        Err(ChatError::BadUserInput(_))
    ));
    assert!(matches!(
        h.chat.send_message(Some(&alice), thread.id, &"x".repeat(5001), None).await,
        Err(ChatError::BadUserInput(_))
    ));

    let longest = h.chat.send_message(Some(&alice), thread.id, &"x".repeat(5000), None).await.unwrap();
    assert_eq!(longest.content.chars().count(), 5000);

    let stored = h.store.find_context(thread.id).await.unwrap().unwrap();
    assert_eq!(stored.message_count, 1);
}

#[tokio::test]
async fn edit_allowed_for_sender_within_five_minutes_only() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    let message = h.chat.send_message(Some(&alice), thread.id, "draft", None).await.unwrap();

    assert!(matches!(
        h.chat.edit_message(Some(&bob), message.id, "hijack").await,
        Err(ChatError::Forbidden(_))
    ));

    h.clock.advance(Duration::minutes(5));
    let edited = h.chat.edit_message(Some(&alice), message.id, "final").await.unwrap();
    assert_eq!(edited.content, "final");
    assert_eq!(edited.edited_at, Some(h.clock_now()));

    h.clock.advance(Duration::seconds(1));
    assert!(matches!(
        h.chat.edit_message(Some(&alice), message.id, "too late").await,
        Err(ChatError::FailedPrecondition(_))
    ));
}

#[tokio::test]
async fn editing_a_missing_message_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.chat.edit_message(Some(&user("alice")), uuid::Uuid::new_v4(), "hi").await,
        Err(ChatError::NotFound(_))
    ));
}

#[tokio::test]
async fn soft_delete_rules_in_a_group() {
    let h = harness();
    let group = h
        .group(&[
            ("alice", MemberRole::Member),
            ("bob", MemberRole::Member),
            ("mod", MemberRole::Moderator),
        ])
        .await;
    let alice = user("alice");
    let message = h.chat.send_message(Some(&alice), group.id, "hello all", None).await.unwrap();

    assert!(matches!(
        h.chat.delete_message(Some(&user("bob")), message.id, true).await,
        Err(ChatError::Forbidden(_))
    ));

    assert!(h.chat.delete_message(Some(&alice), message.id, true).await.unwrap());
    let first = h.store.find_message(message.id).await.unwrap().unwrap();
    assert!(h.chat.delete_message(Some(&alice), message.id, true).await.unwrap());
    let second = h.store.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(first.deleted_at, second.deleted_at);

    // Past the window only moderators may delete
    let late = h.chat.send_message(Some(&alice), group.id, "keep?", None).await.unwrap();
    h.clock.advance(Duration::minutes(16));
    assert!(matches!(
        h.chat.delete_message(Some(&alice), late.id, true).await,
        Err(ChatError::Forbidden(_))
    ));
    assert!(h.chat.delete_message(Some(&user("mod")), late.id, true).await.unwrap());
}

#[tokio::test]
async fn retrying_a_delete_after_the_window_is_still_true() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    let message = h.chat.send_message(Some(&alice), thread.id, "double tap", None).await.unwrap();

    h.clock.advance(Duration::minutes(1));
    assert!(h.chat.delete_message(Some(&alice), message.id, true).await.unwrap());

    h.clock.advance(Duration::minutes(15));
    assert!(h.chat.delete_message(Some(&alice), message.id, true).await.unwrap());
}

#[tokio::test]
async fn deleting_an_absent_message_returns_false() {
    let h = harness();
    let deleted = h.chat.delete_message(Some(&user("alice")), uuid::Uuid::new_v4(), true).await.unwrap();
    assert!(!deleted);
}

#[tokio::test]
async fn hard_delete_is_owner_only_and_decrements_the_count() {
    let h = harness();
    let group = h
        .group(&[("owner", MemberRole::Owner), ("mod", MemberRole::Moderator)])
        .await;
    let message = h.chat.send_message(Some(&user("mod")), group.id, "remove me", None).await.unwrap();
    h.chat.add_reaction(Some(&user("owner")), message.id, "👍").await.unwrap();

    assert!(matches!(
        h.chat.delete_message(Some(&user("mod")), message.id, false).await,
        Err(ChatError::Forbidden(_))
    ));

    assert!(h.chat.delete_message(Some(&user("owner")), message.id, false).await.unwrap());
    assert!(h.store.find_message(message.id).await.unwrap().is_none());
    assert!(h.store.list_reactions(message.id).await.unwrap().is_empty());
    assert_eq!(h.store.find_context(group.id).await.unwrap().unwrap().message_count, 0);

    assert!(!h.chat.delete_message(Some(&user("owner")), message.id, false).await.unwrap());
}

#[tokio::test]
async fn duplicate_reactions_store_one_row() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    let message = h.chat.send_message(Some(&alice), thread.id, "🍕?", None).await.unwrap();

    assert!(h.chat.add_reaction(Some(&bob), message.id, "🔥").await.unwrap());
    assert!(h.chat.add_reaction(Some(&bob), message.id, "🔥").await.unwrap());
    assert_eq!(h.store.list_reactions(message.id).await.unwrap().len(), 1);

    assert!(h.chat.remove_reaction(Some(&bob), message.id, "🔥").await.unwrap());
    assert!(h.chat.remove_reaction(Some(&bob), message.id, "🔥").await.unwrap());
    assert!(h.store.list_reactions(message.id).await.unwrap().is_empty());

    assert!(matches!(
        h.chat.add_reaction(Some(&bob), message.id, "🍕").await,
        Err(ChatError::BadUserInput(_))
    ));
}

#[tokio::test]
async fn pages_have_no_overlap_and_no_gap_even_with_equal_timestamps() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    // The clock never moves, so every message shares one timestamp
    let mut sent = Vec::new();
    for i in 0..15 {
        let m = h.chat.send_message(Some(&alice), thread.id, &format!("m{}", i), None).await.unwrap();
        sent.push(m.id);
    }

    let first = h.chat.list_messages(Some(&alice), thread.id, None, Some(10)).await.unwrap();
    assert_eq!(first.items.len(), 10);
    assert!(first.has_more);

    let second = h
        .chat
        .list_messages(Some(&alice), thread.id, first.cursor.as_deref(), Some(10))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 5);
    assert!(!second.has_more);

    let seen: Vec<_> = first.items.iter().chain(second.items.iter()).map(|m| m.id).collect();
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), 15);
    assert_eq!(unique, sent.iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn cursor_stays_put_when_rows_are_deleted() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    for i in 0..6 {
        h.chat.send_message(Some(&alice), thread.id, &format!("m{}", i), None).await.unwrap();
        h.clock.advance(Duration::milliseconds(1));
    }

    let first = h.chat.list_messages(Some(&alice), thread.id, None, Some(3)).await.unwrap();
    let admin = chat_core::types::Actor::admin("root");
    h.chat.delete_message(Some(&admin), first.items[0].id, false).await.unwrap();

    let second = h
        .chat
        .list_messages(Some(&alice), thread.id, first.cursor.as_deref(), Some(3))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 3);
    assert!(second.items.iter().all(|m| !first.items.iter().any(|f| f.id == m.id)));
}

#[tokio::test]
async fn foreign_cursor_is_bad_input() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    assert!(matches!(
        h.chat.list_messages(Some(&alice), thread.id, Some("b2Zmc2V0OjEw"), None).await,
        Err(ChatError::BadUserInput(_))
    ));
}

#[tokio::test]
async fn rate_limit_aborts_before_any_write() {
    let h = harness_with(ChatSettings {
        send_limit: RateLimitRule::new(2, 10),
        ..ChatSettings::default()
    });
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    h.chat.send_message(Some(&alice), thread.id, "1", None).await.unwrap();
    h.chat.send_message(Some(&alice), thread.id, "2", None).await.unwrap();
    assert!(matches!(
        h.chat.send_message(Some(&alice), thread.id, "3", None).await,
        Err(ChatError::RateLimited(_))
    ));
    assert_eq!(h.store.find_context(thread.id).await.unwrap().unwrap().message_count, 2);

    h.clock.advance(Duration::seconds(10));
    h.chat.send_message(Some(&alice), thread.id, "4", None).await.unwrap();
}

#[tokio::test]
async fn outsiders_and_banned_members_are_forbidden() {
    let h = harness();
    let group = h.group(&[("alice", MemberRole::Member)]).await;

    assert!(matches!(
        h.chat.send_message(Some(&user("eve")), group.id, "hi", None).await,
        Err(ChatError::Forbidden(_))
    ));

    h.set_member(group.id, "alice", MemberStatus::Banned, MemberRole::Member).await;
    assert!(matches!(
        h.chat.list_messages(Some(&user("alice")), group.id, None, None).await,
        Err(ChatError::Forbidden(_))
    ));
}

#[tokio::test]
async fn blocked_threads_refuse_new_messages() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    h.store.set_block("bob", "alice", true).await.unwrap();

    assert!(matches!(
        h.chat.send_message(Some(&alice), thread.id, "hello?", None).await,
        Err(ChatError::Forbidden(_))
    ));
    assert!(matches!(
        h.chat.get_or_create_dm_thread(Some(&alice), "bob").await,
        Err(ChatError::Forbidden(_))
    ));
}

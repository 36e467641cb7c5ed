mod common;

use chat_core::store::MessageRepo;
use chat_core::types::{MemberRole, NotificationKind};
use chat_core::{ChatError, ChatEvent};
use chat_notify::NotificationFanout;
use chrono::Duration;
use common::{harness, user};
use std::sync::Arc;

#[tokio::test]
async fn muted_members_get_no_notification_and_others_get_exactly_one() {
    let h = harness();
    let group = h
        .group(&[
            ("alice", MemberRole::Owner),
            ("bob", MemberRole::Member),
            ("carol", MemberRole::Member),
        ])
        .await;
    assert!(h.chat.set_mute(Some(&user("carol")), group.id, true).await.unwrap());

    let message = h.chat.send_message(Some(&user("alice")), group.id, "meetup at 7", None).await.unwrap();

    // A second fanout for the same message must not duplicate anything
    let fanout = NotificationFanout::new(
        h.store.clone(),
        h.bus.clone(),
        Arc::new(h.clock.clone()),
        std::time::Duration::from_millis(250),
    );
    let repeated = fanout.fanout(&group, &message).await.unwrap();
    assert!(repeated.is_empty());

    let rows = h.store.notifications();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recipient_id, "bob");
    assert_eq!(rows[0].kind, NotificationKind::GroupMessage);
    assert_eq!(rows[0].dedupe_key, format!("group_message:bob:{}", message.id));
}

#[tokio::test]
async fn unmuting_restores_notifications() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    h.chat.set_mute(Some(&bob), thread.id, true).await.unwrap();
    h.chat.send_message(Some(&alice), thread.id, "quiet", None).await.unwrap();
    assert!(h.store.notifications().is_empty());

    h.chat.set_mute(Some(&bob), thread.id, false).await.unwrap();
    h.chat.send_message(Some(&alice), thread.id, "loud", None).await.unwrap();
    assert_eq!(h.store.notifications().len(), 1);
}

#[tokio::test]
async fn fanout_failure_never_fails_the_send() {
    let h = harness();
    let alice = user("alice");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();
    h.store.fail_notification_writes(true);

    let message = h.chat.send_message(Some(&alice), thread.id, "still delivered", None).await.unwrap();
    assert!(h.store.find_message(message.id).await.unwrap().is_some());
    assert!(h.store.notifications().is_empty());
}

#[tokio::test]
async fn mark_read_zeroes_the_count_and_new_messages_raise_it() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    h.chat.send_message(Some(&alice), thread.id, "one", None).await.unwrap();
    h.chat.send_message(Some(&alice), thread.id, "two", None).await.unwrap();
    assert_eq!(h.chat.unread_count(Some(&bob), thread.id).await.unwrap(), 2);

    assert!(h.chat.mark_read(Some(&bob), thread.id, None).await.unwrap());
    assert_eq!(h.chat.unread_count(Some(&bob), thread.id).await.unwrap(), 0);

    // The count above is cached; a new message must still show up immediately
    h.clock.advance(Duration::seconds(1));
    h.chat.send_message(Some(&alice), thread.id, "three", None).await.unwrap();
    assert_eq!(h.chat.unread_count(Some(&bob), thread.id).await.unwrap(), 1);

    // The sender's own messages never count
    assert_eq!(h.chat.unread_count(Some(&alice), thread.id).await.unwrap(), 0);
}

#[tokio::test]
async fn deleted_messages_do_not_count_as_unread() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    let message = h.chat.send_message(Some(&alice), thread.id, "oops", None).await.unwrap();
    assert_eq!(h.chat.unread_count(Some(&bob), thread.id).await.unwrap(), 1);

    h.chat.delete_message(Some(&alice), message.id, true).await.unwrap();
    assert_eq!(h.chat.unread_count(Some(&bob), thread.id).await.unwrap(), 0);
}

#[tokio::test]
async fn first_dm_end_to_end() {
    let h = harness();
    let a = user("A");
    let b = user("B");

    let message = h.chat.send_direct_message(Some(&a), "B", "hello", None).await.unwrap();
    let thread = h.chat.get_or_create_dm_thread(Some(&b), "A").await.unwrap();
    assert_eq!(thread.pair_key.as_deref(), Some("A|B"));
    assert_eq!(thread.id, message.context_id);
    assert_eq!(message.read_at, None);

    assert_eq!(h.chat.unread_count(Some(&b), thread.id).await.unwrap(), 1);
    h.chat.mark_read(Some(&b), thread.id, None).await.unwrap();
    assert_eq!(h.chat.unread_count(Some(&b), thread.id).await.unwrap(), 0);

    let receipt = h.store.find_message(message.id).await.unwrap().unwrap();
    assert!(receipt.read_at.is_some());

    h.clock.advance(Duration::minutes(6));
    assert!(matches!(
        h.chat.edit_message(Some(&a), message.id, "hello!").await,
        Err(ChatError::FailedPrecondition(_))
    ));
}

#[tokio::test]
async fn subscribers_see_lifecycle_typing_and_notifications() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    let thread = h.chat.get_or_create_dm_thread(Some(&alice), "bob").await.unwrap();

    let mut messages = h.chat.subscribe_messages(Some(&bob), thread.id).await.unwrap();
    let mut typing = h.chat.subscribe_typing(Some(&bob), thread.id).await.unwrap();
    let mut inbox = h.chat.subscribe_notifications(Some(&bob)).await.unwrap();

    h.chat.set_typing(Some(&alice), thread.id, true).await.unwrap();
    match typing.next().await {
        Some(ChatEvent::TypingChanged { user_id, is_typing, .. }) => {
            assert_eq!(user_id, "alice");
            assert!(is_typing);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let sent = h.chat.send_message(Some(&alice), thread.id, "live", None).await.unwrap();
    assert_eq!(messages.next().await, Some(ChatEvent::MessageAdded { message: sent.clone() }));
    match inbox.next().await {
        Some(ChatEvent::NotificationAdded { notification }) => assert_eq!(notification.entity_id, sent.id),
        other => panic!("unexpected event: {:?}", other),
    }

    let edited = h.chat.edit_message(Some(&alice), sent.id, "live!").await.unwrap();
    assert_eq!(messages.next().await, Some(ChatEvent::MessageEdited { message: edited }));

    h.chat.delete_message(Some(&alice), sent.id, true).await.unwrap();
    match messages.next().await {
        Some(ChatEvent::MessageDeleted { message_id, hard, .. }) => {
            assert_eq!(message_id, sent.id);
            assert!(!hard);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn outsiders_cannot_subscribe() {
    let h = harness();
    let thread = h.chat.get_or_create_dm_thread(Some(&user("alice")), "bob").await.unwrap();

    assert!(matches!(
        h.chat.subscribe_messages(Some(&user("eve")), thread.id).await,
        Err(ChatError::Forbidden(_))
    ));
    assert!(matches!(
        h.chat.subscribe_notifications(None).await,
        Err(ChatError::Unauthenticated)
    ));
}

#[tokio::test]
async fn notification_inbox_is_private_to_the_recipient() {
    let h = harness();
    let alice = user("alice");
    let bob = user("bob");
    h.chat.send_direct_message(Some(&alice), "bob", "ping", None).await.unwrap();

    let inbox = h.chat.list_notifications(Some(&bob), None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(h.chat.list_notifications(Some(&alice), None).await.unwrap().is_empty());

    assert!(matches!(
        h.chat.mark_notification_read(Some(&alice), inbox[0].id).await,
        Err(ChatError::Forbidden(_))
    ));
    assert!(h.chat.mark_notification_read(Some(&bob), inbox[0].id).await.unwrap());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn channel_set_routes_to_registered_transport() {
    let fake = FakeTransport::new();
    let set = ChannelSet::new().with(ChannelKind::Discord, Arc::new(fake.clone()));

    set.send(
        ChannelKind::Discord,
        "https://hook.example/1",
        &ChannelMessage::plain("dispatched ENG-1"),
    )
    .await
    .unwrap();

    let sent = fake.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, "https://hook.example/1");
    assert_eq!(sent[0].message.text, "dispatched ENG-1");
}

#[tokio::test]
async fn missing_transport_is_a_distinct_error() {
    let set = ChannelSet::new();
    let err = set
        .send(ChannelKind::Telegram, "chat-1", &ChannelMessage::plain("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::UnknownChannel(ChannelKind::Telegram)));
}

#[tokio::test]
async fn fake_scripted_failure_only_hits_named_target() {
    let fake = FakeTransport::new().fail_for("bad-target");
    assert!(fake
        .send("bad-target", &ChannelMessage::plain("x"))
        .await
        .is_err());
    assert!(fake
        .send("good-target", &ChannelMessage::plain("x"))
        .await
        .is_ok());
    assert_eq!(fake.sent().len(), 1);
}

#[test]
fn plain_message_has_no_rich_forms() {
    let msg = ChannelMessage::plain("hello");
    assert!(msg.embed.is_none());
    assert!(msg.html.is_none());
}

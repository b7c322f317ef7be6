// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use claw_adapters::channel::FakeTransport;
use claw_core::config::NotifyTarget;
use std::sync::Arc;

fn target(channel: ChannelKind, target: &str) -> NotifyTarget {
    NotifyTarget { channel, target: target.to_string(), account_id: None }
}

fn payload(identifier: &str) -> NotifyPayload {
    NotifyPayload {
        identifier: identifier.to_string(),
        title: "Fix the cache".to_string(),
        status: "working".to_string(),
        ..NotifyPayload::default()
    }
}

fn notifier_with(
    targets: Vec<NotifyTarget>,
    rich: bool,
    fake: &FakeTransport,
) -> Notifier {
    let config = NotificationsConfig {
        targets,
        events: Default::default(),
        rich_format: rich,
    };
    let channels = ChannelSet::new()
        .with(ChannelKind::Discord, Arc::new(fake.clone()))
        .with(ChannelKind::Telegram, Arc::new(fake.clone()));
    Notifier::new(config, channels)
}

#[tokio::test]
async fn no_targets_is_a_noop() {
    let fake = FakeTransport::new();
    let notifier = notifier_with(vec![], false, &fake);
    notifier.notify(NotifyKind::Working, &payload("ENG-1")).await;
    assert!(fake.sent().is_empty());
    assert!(!Notifier::noop().has_targets());
}

#[tokio::test]
async fn plain_message_reaches_every_target() {
    let fake = FakeTransport::new();
    let notifier = notifier_with(
        vec![
            target(ChannelKind::Discord, "hook-a"),
            target(ChannelKind::Telegram, "chat-b"),
        ],
        false,
        &fake,
    );
    notifier.notify(NotifyKind::Dispatch, &payload("ENG-1")).await;

    let sent = fake.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|s| s.message.text.contains("ENG-1")));
    assert!(sent.iter().all(|s| s.message.embed.is_none()));
}

#[tokio::test]
async fn one_failing_target_does_not_block_the_others() {
    let fake = FakeTransport::new().fail_for("hook-bad");
    let notifier = notifier_with(
        vec![
            target(ChannelKind::Discord, "hook-bad"),
            target(ChannelKind::Discord, "hook-good"),
            target(ChannelKind::Telegram, "chat-good"),
        ],
        false,
        &fake,
    );
    notifier.notify(NotifyKind::AuditPass, &payload("ENG-2")).await;

    let sent = fake.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|s| s.target != "hook-bad"));
}

#[tokio::test]
async fn suppressed_event_is_not_sent() {
    let fake = FakeTransport::new();
    let mut config = NotificationsConfig {
        targets: vec![target(ChannelKind::Discord, "hook-a")],
        events: Default::default(),
        rich_format: false,
    };
    config.events.insert("working".to_string(), false);
    let channels = ChannelSet::new().with(ChannelKind::Discord, Arc::new(fake.clone()));
    let notifier = Notifier::new(config, channels);

    notifier.notify(NotifyKind::Working, &payload("ENG-1")).await;
    assert!(fake.sent().is_empty());

    notifier.notify(NotifyKind::Auditing, &payload("ENG-1")).await;
    assert_eq!(fake.sent().len(), 1);
}

#[tokio::test]
async fn rich_mode_adds_embed_and_html_per_family() {
    let fake = FakeTransport::new();
    let notifier = notifier_with(
        vec![
            target(ChannelKind::Discord, "hook-a"),
            target(ChannelKind::Telegram, "chat-b"),
        ],
        true,
        &fake,
    );
    notifier.notify(NotifyKind::Escalation, &payload("ENG-3")).await;

    let sent = fake.sent();
    let discord = sent.iter().find(|s| s.target == "hook-a").unwrap();
    let embed = discord.message.embed.as_ref().unwrap();
    assert!(embed.title.contains("ENG-3"));
    assert_eq!(embed.color, 0xE74C3C);

    let telegram = sent.iter().find(|s| s.target == "chat-b").unwrap();
    let html = telegram.message.html.as_ref().unwrap();
    assert!(html.starts_with("<b>ENG-3</b>"));
}

#[tokio::test]
async fn audit_fail_lists_gaps_with_one_based_attempt() {
    let fake = FakeTransport::new();
    let notifier = notifier_with(vec![target(ChannelKind::Discord, "hook-a")], false, &fake);
    let mut p = payload("ENG-4");
    p.attempt = Some(0);
    p.verdict = Some(Verdict {
        pass: false,
        criteria: vec![],
        gaps: vec!["missing tests".to_string()],
        test_results: String::new(),
    });
    notifier.notify(NotifyKind::AuditFail, &p).await;

    let text = &fake.sent()[0].message.text;
    assert!(text.contains("attempt 1"), "got: {text}");
    assert!(text.contains("- missing tests"));
}

#[tokio::test]
async fn watchdog_kill_carries_timeout_reason() {
    let fake = FakeTransport::new();
    let notifier = notifier_with(vec![target(ChannelKind::Discord, "hook-a")], false, &fake);
    let mut p = payload("ENG-5");
    p.reason = Some("no output for 300s, killed twice".to_string());
    notifier.notify(NotifyKind::WatchdogKill, &p).await;
    assert!(fake.sent()[0].message.text.contains("killed twice"));
}

#[test]
fn html_escape_covers_angle_brackets() {
    assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
}

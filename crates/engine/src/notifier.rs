// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle notifications fanned out over the configured targets.
//!
//! One target failing must never silence the others, so sends run
//! concurrently and each failure is logged (through redaction) instead of
//! propagated. With no targets configured the notifier is a no-op.

use crate::redact::redact;
use claw_adapters::channel::{ChannelMessage, ChannelSet, Embed};
use claw_core::config::{ChannelKind, NotificationsConfig};
use claw_core::verdict::Verdict;
use futures_util::future::join_all;

/// Lifecycle event families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Dispatch,
    Working,
    Auditing,
    AuditPass,
    AuditFail,
    Escalation,
    Stuck,
    WatchdogKill,
    ProjectProgress,
    Test,
}

claw_core::simple_display! {
    NotifyKind {
        Dispatch => "dispatch",
        Working => "working",
        Auditing => "auditing",
        AuditPass => "audit_pass",
        AuditFail => "audit_fail",
        Escalation => "escalation",
        Stuck => "stuck",
        WatchdogKill => "watchdog_kill",
        ProjectProgress => "project_progress",
        Test => "test",
    }
}

impl NotifyKind {
    /// Severity color for embed-capable channels.
    fn color(&self) -> u32 {
        match self {
            NotifyKind::AuditPass => 0x2ECC71,
            NotifyKind::AuditFail => 0xE67E22,
            NotifyKind::Escalation | NotifyKind::Stuck | NotifyKind::WatchdogKill => 0xE74C3C,
            NotifyKind::Dispatch
            | NotifyKind::Working
            | NotifyKind::Auditing
            | NotifyKind::ProjectProgress
            | NotifyKind::Test => 0x3498DB,
        }
    }
}

/// Event payload; kinds use the fields they need.
#[derive(Debug, Clone, Default)]
pub struct NotifyPayload {
    pub identifier: String,
    pub title: String,
    pub status: String,
    /// 0-based internally; rendered 1-based for humans.
    pub attempt: Option<u32>,
    pub verdict: Option<Verdict>,
    pub reason: Option<String>,
}

/// Fan-out notifier over the configured targets.
pub struct Notifier {
    config: NotificationsConfig,
    channels: ChannelSet,
}

impl Notifier {
    pub fn new(config: NotificationsConfig, channels: ChannelSet) -> Self {
        Self { config, channels }
    }

    /// No-op notifier for configurations without targets.
    pub fn noop() -> Self {
        Self::new(NotificationsConfig::default(), ChannelSet::new())
    }

    pub fn has_targets(&self) -> bool {
        !self.config.targets.is_empty()
    }

    fn enabled(&self, kind: NotifyKind) -> bool {
        self.config
            .events
            .get(&kind.to_string())
            .copied()
            .unwrap_or(true)
    }

    /// Deliver `kind` to every matching target, isolating failures.
    pub async fn notify(&self, kind: NotifyKind, payload: &NotifyPayload) {
        if self.config.targets.is_empty() || !self.enabled(kind) {
            return;
        }

        let text = format_plain(kind, payload);
        let sends = self.config.targets.iter().map(|target| {
            let message = self.message_for(target.channel, kind, payload, &text);
            let channels = &self.channels;
            async move {
                if let Err(e) = channels.send(target.channel, &target.target, &message).await {
                    tracing::warn!(
                        channel = %target.channel,
                        kind = %kind,
                        error = %redact(&e.to_string()),
                        "notification target failed"
                    );
                }
            }
        });
        join_all(sends).await;
    }

    fn message_for(
        &self,
        channel: ChannelKind,
        kind: NotifyKind,
        payload: &NotifyPayload,
        text: &str,
    ) -> ChannelMessage {
        let mut message = ChannelMessage::plain(text);
        if !self.config.rich_format {
            return message;
        }
        match channel {
            ChannelKind::Discord => {
                message.embed = Some(Embed {
                    title: format!("{} — {}", heading(kind), payload.identifier),
                    description: text.to_string(),
                    color: kind.color(),
                });
            }
            ChannelKind::Telegram => {
                message.html = Some(format!(
                    "<b>{}</b> {}",
                    escape_html(&payload.identifier),
                    escape_html(text)
                ));
            }
            ChannelKind::Desktop => {}
        }
        message
    }
}

fn heading(kind: NotifyKind) -> &'static str {
    match kind {
        NotifyKind::Dispatch => "Dispatched",
        NotifyKind::Working => "Worker started",
        NotifyKind::Auditing => "Audit started",
        NotifyKind::AuditPass => "Audit passed",
        NotifyKind::AuditFail => "Audit failed",
        NotifyKind::Escalation => "Needs your help",
        NotifyKind::Stuck => "Stuck",
        NotifyKind::WatchdogKill => "Agent timed out",
        NotifyKind::ProjectProgress => "Project progress",
        NotifyKind::Test => "Test notification",
    }
}

/// Human attempt numbering: internal attempt 0 is "attempt 1".
fn human_attempt(attempt: Option<u32>) -> u32 {
    attempt.unwrap_or(0) + 1
}

fn format_plain(kind: NotifyKind, payload: &NotifyPayload) -> String {
    let identifier = &payload.identifier;
    let title = &payload.title;
    match kind {
        NotifyKind::Dispatch => format!("{}: {identifier} — {title}", heading(kind)),
        NotifyKind::Working => format!(
            "{}: {identifier} — {title} (attempt {})",
            heading(kind),
            human_attempt(payload.attempt)
        ),
        NotifyKind::Auditing => format!(
            "{}: {identifier} (attempt {})",
            heading(kind),
            human_attempt(payload.attempt)
        ),
        NotifyKind::AuditPass => {
            let mut out = format!("{}: {identifier} — {title}", heading(kind));
            if let Some(v) = &payload.verdict {
                if !v.test_results.is_empty() {
                    out.push_str(&format!("\nTests: {}", v.test_results));
                }
            }
            out
        }
        NotifyKind::AuditFail => {
            let mut out = format!(
                "{}: {identifier} (attempt {})",
                heading(kind),
                human_attempt(payload.attempt)
            );
            if let Some(v) = &payload.verdict {
                if !v.gaps.is_empty() {
                    out.push_str("\nGaps:");
                    for gap in &v.gaps {
                        out.push_str(&format!("\n- {gap}"));
                    }
                }
            }
            out
        }
        NotifyKind::Escalation => {
            let mut out = format!("{}: {identifier} — {title}", heading(kind));
            if let Some(v) = &payload.verdict {
                for gap in &v.gaps {
                    out.push_str(&format!("\n- {gap}"));
                }
            }
            out
        }
        NotifyKind::Stuck => format!(
            "{}: {identifier} ({})",
            heading(kind),
            payload.reason.as_deref().unwrap_or("no reason recorded")
        ),
        NotifyKind::WatchdogKill => format!(
            "{}: {identifier} — {}",
            heading(kind),
            payload
                .reason
                .as_deref()
                .unwrap_or("no output before the watchdog bound")
        ),
        NotifyKind::ProjectProgress => format!(
            "{}: {title} — {}",
            heading(kind),
            payload.status
        ),
        NotifyKind::Test => format!("{} from claw ({identifier})", heading(kind)),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;

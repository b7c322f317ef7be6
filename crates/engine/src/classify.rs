// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intent classification for tracker comments.
//!
//! The classifier is an LLM call with a short timeout; when it fails or
//! answers nonsense, a deterministic keyword heuristic takes over and the
//! result is flagged `from_fallback`. Callers must consult the active-run
//! guard *before* classifying; a comment on an issue we already own never
//! reaches this module.

use claw_adapters::classifier::{ClassifierTransport, CLASSIFY_TIMEOUT};
use claw_core::sanitize::{sanitize_prompt_input, MAX_PROMPT_INPUT_CHARS};
use serde::Deserialize;

/// The closed intent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    General,
    AskAgent,
    RequestWork,
    Question,
    CloseIssue,
    PlanStart,
    PlanContinue,
    PlanFinalize,
    PlanAbandon,
}

claw_core::simple_display! {
    Intent {
        General => "general",
        AskAgent => "ask_agent",
        RequestWork => "request_work",
        Question => "question",
        CloseIssue => "close_issue",
        PlanStart => "plan_start",
        PlanContinue => "plan_continue",
        PlanFinalize => "plan_finalize",
        PlanAbandon => "plan_abandon",
    }
}

/// Issue facts given to the classifier for context.
#[derive(Debug, Clone, Default)]
pub struct IssueContext {
    pub identifier: String,
    pub title: String,
    pub state_name: String,
}

/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub agent_id: Option<String>,
    pub reasoning: String,
    /// True when the heuristic answered instead of the LLM.
    pub from_fallback: bool,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: Intent,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    reasoning: String,
}

/// LLM-backed classifier with a deterministic fallback.
pub struct IntentClassifier<X: ClassifierTransport> {
    transport: X,
}

impl<X: ClassifierTransport> IntentClassifier<X> {
    pub fn new(transport: X) -> Self {
        Self { transport }
    }

    pub async fn classify(&self, comment_body: &str, ctx: &IssueContext) -> Classification {
        let prompt = build_prompt(comment_body, ctx);
        let response = tokio::time::timeout(CLASSIFY_TIMEOUT, self.transport.complete(&prompt)).await;

        match response {
            Ok(Ok(text)) => match parse_response(&text) {
                Some(c) => c,
                None => {
                    tracing::debug!(response = %text, "classifier answer unparseable, using heuristic");
                    heuristic_classify(comment_body)
                }
            },
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "classifier transport failed, using heuristic");
                heuristic_classify(comment_body)
            }
            Err(_) => {
                tracing::debug!("classifier timed out, using heuristic");
                heuristic_classify(comment_body)
            }
        }
    }
}

fn build_prompt(comment_body: &str, ctx: &IssueContext) -> String {
    let body = sanitize_prompt_input(Some(comment_body), MAX_PROMPT_INPUT_CHARS);
    format!(
        "Classify the intent of this comment on issue {} ({}, state: {}).\n\
         Answer with one JSON object: {{\"intent\": \"<one of: general, ask_agent, \
         request_work, question, close_issue, plan_start, plan_continue, plan_finalize, \
         plan_abandon>\", \"agent_id\": null, \"reasoning\": \"...\"}}\n\n\
         Comment:\n{}",
        ctx.identifier, ctx.title, ctx.state_name, body
    )
}

fn parse_response(text: &str) -> Option<Classification> {
    // The transport answer may wrap the JSON in prose; reuse the tolerant
    // fragment scan from verdict parsing by trying the trimmed whole first.
    let parsed: RawClassification = serde_json::from_str(text.trim())
        .ok()
        .or_else(|| {
            text.find('{')
                .and_then(|start| text.rfind('}').map(|end| &text[start..=end]))
                .and_then(|fragment| serde_json::from_str(fragment).ok())
        })?;
    Some(Classification {
        intent: parsed.intent,
        agent_id: parsed.agent_id,
        reasoning: parsed.reasoning,
        from_fallback: false,
    })
}

/// Keyword heuristic used when the LLM is unavailable.
pub fn heuristic_classify(comment_body: &str) -> Classification {
    let lower = comment_body.to_lowercase();
    let intent = if lower.contains("abandon") && lower.contains("plan") {
        Intent::PlanAbandon
    } else if (lower.contains("finalize") || lower.contains("finalise")) && lower.contains("plan") {
        Intent::PlanFinalize
    } else if lower.contains("plan") && lower.contains("continue") {
        Intent::PlanContinue
    } else if lower.starts_with("plan") || lower.contains("make a plan") {
        Intent::PlanStart
    } else if lower.contains("close this issue")
        || lower.contains("close the issue")
        || lower.starts_with("/close")
    {
        Intent::CloseIssue
    } else if WORK_VERBS.iter().any(|v| lower.contains(v)) {
        Intent::RequestWork
    } else if lower.contains('?') {
        Intent::Question
    } else {
        Intent::General
    };

    Classification {
        intent,
        agent_id: None,
        reasoning: "keyword heuristic".to_string(),
        from_fallback: true,
    }
}

const WORK_VERBS: &[&str] = &[
    "fix", "implement", "add ", "refactor", "update the", "build ", "write ", "create ",
];

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Classifier LLM transport.
//!
//! Intent classification wants one short completion. The engine owns the
//! prompt and the fallback heuristic; this module only moves text to an
//! LLM endpoint and back, under a strict timeout.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Classification must answer fast or get out of the way.
pub const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier timed out")]
    Timeout,
}

/// One-shot completion transport.
#[async_trait]
pub trait ClassifierTransport: Send + Sync + 'static {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// HTTP transport posting `{prompt}` to a completion endpoint that
/// answers `{"text": "..."}`. The API key is read from the environment.
#[derive(Clone)]
pub struct HttpClassifierTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifierTransport {
    pub const API_KEY_ENV: &'static str = "CLAW_CLASSIFIER_API_KEY";

    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl ClassifierTransport for HttpClassifierTransport {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(CLASSIFY_TIMEOUT)
            .json(&json!({ "prompt": prompt }));
        if let Ok(key) = std::env::var(Self::API_KEY_ENV) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Request(e.to_string())
            }
        })?;
        let completion: CompletionResponse = response
            .error_for_status()
            .map_err(|e| ClassifierError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;
        Ok(completion.text)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeClassifierState {
        response: Option<String>,
        fail: bool,
        prompts: Vec<String>,
    }

    /// Scripted classifier transport.
    #[derive(Clone, Default)]
    pub struct FakeClassifierTransport {
        state: Arc<Mutex<FakeClassifierState>>,
    }

    impl FakeClassifierTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond_with(self, text: &str) -> Self {
            self.state.lock().response = Some(text.to_string());
            self
        }

        pub fn failing(self) -> Self {
            self.state.lock().fail = true;
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.state.lock().prompts.clone()
        }
    }

    #[async_trait]
    impl ClassifierTransport for FakeClassifierTransport {
        async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
            let mut state = self.state.lock();
            state.prompts.push(prompt.to_string());
            if state.fail {
                return Err(ClassifierError::Timeout);
            }
            Ok(state
                .response
                .clone()
                .unwrap_or_else(|| r#"{"intent": "general", "reasoning": "default"}"#.to_string()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeClassifierTransport;

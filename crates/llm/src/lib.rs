use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voyage_core::{PlannerResult, Prompt, RecordKind};

mod chat;
mod scripted;

pub use chat::{ChatCompletionClient, LlmSettings, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use scripted::{ScriptedCompletionClient, ScriptedReply};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub purpose: RecordKind,
    pub system: String,
    pub user: String,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(purpose: RecordKind, prompt: Prompt, timeout: Duration) -> Self {
        Self {
            purpose,
            system: prompt.system,
            user: prompt.user,
            timeout,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            usage: None,
        }
    }
}

/// Sends a prompt to a chat-completion service and returns the raw text.
///
/// Implementations must report a missing credential as
/// `PlannerError::Configuration` before any network activity, and every
/// transport, timeout or status failure as `PlannerError::Upstream`.
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> PlannerResult<CompletionResponse>;
}

#[derive(Clone)]
pub enum CompletionBackend {
    Remote(ChatCompletionClient),
    Scripted(ScriptedCompletionClient),
}

impl CompletionBackend {
    pub fn from_settings(settings: LlmSettings) -> PlannerResult<Self> {
        Ok(Self::Remote(ChatCompletionClient::new(settings)?))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Scripted(_) => "scripted",
        }
    }

    pub fn is_configured(&self) -> bool {
        match self {
            Self::Remote(client) => client.has_credential(),
            Self::Scripted(client) => client.has_credential(),
        }
    }
}

impl CompletionClient for CompletionBackend {
    async fn complete(&self, request: &CompletionRequest) -> PlannerResult<CompletionResponse> {
        match self {
            Self::Remote(client) => client.complete(request).await,
            Self::Scripted(client) => client.complete(request).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTimeouts {
    pub itinerary: Duration,
    pub extraction: Duration,
}

impl Default for CompletionTimeouts {
    fn default() -> Self {
        Self {
            itinerary: Duration::from_secs(90),
            extraction: Duration::from_secs(60),
        }
    }
}

impl CompletionTimeouts {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            itinerary: seconds_from_env("VOYAGE_ITINERARY_TIMEOUT_SECONDS")
                .unwrap_or(defaults.itinerary),
            extraction: seconds_from_env("VOYAGE_EXTRACTION_TIMEOUT_SECONDS")
                .unwrap_or(defaults.extraction),
        }
    }

    pub fn for_kind(&self, kind: RecordKind) -> Duration {
        match kind {
            RecordKind::Itinerary => self.itinerary,
            RecordKind::Expense | RecordKind::TripInfo | RecordKind::BudgetNarrative => {
                self.extraction
            }
        }
    }
}

fn seconds_from_env(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itinerary_gets_the_longer_timeout() {
        let timeouts = CompletionTimeouts::default();
        assert_eq!(
            timeouts.for_kind(RecordKind::Itinerary),
            Duration::from_secs(90)
        );
        assert_eq!(timeouts.for_kind(RecordKind::Expense), Duration::from_secs(60));
        assert_eq!(
            timeouts.for_kind(RecordKind::BudgetNarrative),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn request_carries_prompt_parts() {
        let request = CompletionRequest::new(
            RecordKind::TripInfo,
            Prompt {
                system: "sys".to_string(),
                user: "usr".to_string(),
            },
            Duration::from_secs(5),
        );
        assert_eq!(request.system, "sys");
        assert_eq!(request.user, "usr");
        assert_eq!(request.purpose, RecordKind::TripInfo);
    }
}

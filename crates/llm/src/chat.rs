use std::env;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voyage_core::{PlannerError, PlannerResult};

use crate::{CompletionClient, CompletionRequest, CompletionResponse, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";

#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl LlmSettings {
    pub fn from_env() -> Self {
        let api_key = env::var("DASHSCOPE_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let model = env::var("DASHSCOPE_MODEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = env::var("DASHSCOPE_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            api_key,
            model,
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct ChatCompletionClient {
    settings: LlmSettings,
    http: Client,
}

impl ChatCompletionClient {
    pub fn new(settings: LlmSettings) -> PlannerResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| {
                PlannerError::Configuration(format!("failed to build http client: {err}"))
            })?;

        Ok(Self { settings, http })
    }

    pub fn has_credential(&self) -> bool {
        self.settings.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> PlannerResult<CompletionResponse> {
        let api_key = self.settings.api_key.as_deref().ok_or_else(|| {
            PlannerError::Configuration("DASHSCOPE_API_KEY is not set".to_string())
        })?;

        let body = ChatBody {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 0.0,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(self.settings.endpoint())
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                purpose = request.purpose.as_code(),
                status = status.as_u16(),
                "completion service returned non-success status"
            );
            return Err(PlannerError::Upstream(format!(
                "status {}: {}",
                status.as_u16(),
                detail.chars().take(300).collect::<String>()
            )));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|err| transport_error(err, request.timeout))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PlannerError::Upstream("completion reply has no content".to_string()))?;

        debug!(
            purpose = request.purpose.as_code(),
            latency_ms = started.elapsed().as_millis() as u64,
            raw = %content,
            "completion received"
        );

        Ok(CompletionResponse {
            content,
            model: reply.model,
            usage: reply.usage,
        })
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> PlannerError {
    if err.is_timeout() {
        PlannerError::Upstream(format!("timed out after {}s", timeout.as_secs()))
    } else if err.is_decode() {
        PlannerError::Upstream(format!("unreadable completion reply: {err}"))
    } else {
        PlannerError::Upstream(format!("request failed: {err}"))
    }
}

use async_trait::async_trait;
use config::LlmConfig;
use eg_core::traits::{LlmError, LlmService};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Chat client for an OpenAI-compatible completions endpoint. Outage
/// conditions (transport errors, 429, 5xx) surface as
/// `LlmError::Unavailable` so the summarizer can degrade instead of
/// failing the job.
pub struct OpenAiLlmService {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiLlmService {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Failed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmService for OpenAiLlmService {
    async fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| LlmError::Unavailable {
            reason: format!("transport error: {e}"),
        })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(LlmError::Unavailable {
                reason: format!("upstream returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(LlmError::Failed {
                reason: format!("upstream returned {status}"),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| LlmError::Failed {
            reason: format!("malformed completion response: {e}"),
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Failed {
                reason: "completion response had no content".to_string(),
            })?;

        debug!(chars = content.len(), "Received model completion");
        Ok(content)
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use eg_core::traits::{LlmError, LlmService};
use tokio::sync::RwLock;

/// Scriptable in-memory model for tests: exact-prompt responses, a
/// DEFAULT response, or a forced unavailable condition.
pub struct MockLlmService {
    responses: Arc<RwLock<HashMap<String, String>>>,
    unavailable: Arc<RwLock<Option<String>>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(HashMap::new())),
            unavailable: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn add_response(&self, prompt: impl Into<String>, response: impl Into<String>) {
        let mut responses = self.responses.write().await;
        responses.insert(prompt.into(), response.into());
    }

    pub async fn set_default_response(&self, response: &str) {
        let mut responses = self.responses.write().await;
        responses.insert("DEFAULT".to_string(), response.to_string());
    }

    /// Make every subsequent call fail as unavailable.
    pub async fn set_unavailable(&self, reason: &str) {
        *self.unavailable.write().await = Some(reason.to_string());
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        if let Some(reason) = self.unavailable.read().await.clone() {
            return Err(LlmError::Unavailable { reason });
        }

        let responses = self.responses.read().await;
        if let Some(response) = responses.get(prompt) {
            Ok(response.clone())
        } else if let Some(response) = responses.get("DEFAULT") {
            Ok(response.clone())
        } else {
            Ok(format!("Mock response for: {prompt}"))
        }
    }
}

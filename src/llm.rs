//! Model inference client
//!
//! One request/response text-completion seam. The Gemini client is the
//! production implementation; `ScriptedLlm` keeps the demo binary and tests
//! functional without network access. Rate-limit-class failures are retried
//! once against a smaller model tier; callers handle everything else.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

const PRIMARY_MODEL: &str = "gemini-2.0-flash";
const FALLBACK_MODEL: &str = "gemini-2.0-flash-lite";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Text-completion boundary; implementations must never panic.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

//
// ================= Gemini client =================
//

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        })
    }

    async fn generate_with_model(&self, model: &str, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::ModelError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::ModelTimeout(format!("Gemini request timed out: {}", e))
                } else {
                    AgentError::ModelError(format!("Gemini request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || error_text.contains("RESOURCE_EXHAUSTED") {
                return Err(AgentError::ModelRateLimited(format!(
                    "Gemini rate limit on {}: {}",
                    model, error_text
                )));
            }
            return Err(AgentError::ModelError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            AgentError::ModelError(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| AgentError::ModelError("Empty response from Gemini".to_string()))?;

        Ok(answer)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        match self.generate_with_model(PRIMARY_MODEL, prompt).await {
            Ok(answer) => Ok(answer),
            Err(e) if e.is_rate_limit() => {
                warn!(error = %e, "Primary model rate limited, retrying on fallback tier");
                self.generate_with_model(FALLBACK_MODEL, prompt).await
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

//
// ================= Scripted client =================
//

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    RateLimited,
    Timeout,
    Fail,
}

enum EmptyBehavior {
    EchoPrompt,
    Repeat(String),
    Fail,
}

/// Offline model double. Pops queued replies in order; the constructor
/// chooses what happens once the queue runs dry.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
    when_empty: EmptyBehavior,
}

impl ScriptedLlm {
    /// Queue of replies; errors after the queue is exhausted.
    pub fn with_replies(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            when_empty: EmptyBehavior::Fail,
        }
    }

    /// Always returns the prompt itself. Useful for asserting that computed
    /// figures actually reached the prompt.
    pub fn echo() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            when_empty: EmptyBehavior::EchoPrompt,
        }
    }

    /// Always returns the same canned text.
    pub fn canned(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            when_empty: EmptyBehavior::Repeat(reply.into()),
        }
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::RateLimited) => Err(AgentError::ModelRateLimited(
                "scripted rate limit".to_string(),
            )),
            Some(ScriptedReply::Timeout) => {
                Err(AgentError::ModelTimeout("scripted timeout".to_string()))
            }
            Some(ScriptedReply::Fail) => {
                Err(AgentError::ModelError("scripted failure".to_string()))
            }
            None => match &self.when_empty {
                EmptyBehavior::EchoPrompt => Ok(prompt.to_string()),
                EmptyBehavior::Repeat(reply) => Ok(reply.clone()),
                EmptyBehavior::Fail => {
                    info!("Scripted client exhausted");
                    Err(AgentError::ModelError("script exhausted".to_string()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "What's my balance?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("What's my balance?"));
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let llm = ScriptedLlm::with_replies(vec![
            ScriptedReply::Text("one".to_string()),
            ScriptedReply::Fail,
        ]);

        assert_eq!(llm.generate("a").await.unwrap(), "one");
        assert!(llm.generate("b").await.is_err());
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_echo_returns_prompt() {
        let llm = ScriptedLlm::echo();
        let reply = llm.generate("total is 350").await.unwrap();
        assert_eq!(reply, "total is 350");
    }
}

//! LLM completion client
//!
//! Each call is a single stateless chat completion: one system prompt, one
//! user turn. Groq serves an OpenAI-compatible endpoint.

use async_trait::async_trait;
use repogent_core::{HttpConfig, ModelConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth;
use crate::error::LlmError;

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// One completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_content: user_content.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Request with the configured model and the sampling preset for `task`
    ///
    /// Classification runs deterministic; free-form replies run warmer.
    pub fn for_task(
        models: &ModelConfig,
        task: &str,
        system_prompt: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        let (max_tokens, temperature) = match task {
            "issue_triage" => (512, 0.0),
            "pr_review" | "community_qa" => (2048, 0.3),
            _ => (DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE),
        };
        Self::new(models.model_for_task(task), system_prompt, user_content)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Text completion collaborator
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Response text; `Ok("")` is a real empty answer, [`LlmError::NoContent`] is none at all
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's content from a chat completions body
pub fn parse_completion(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedJson(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(LlmError::NoContent)
}

/// Groq chat completions client
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl GroqClient {
    pub fn new(
        api_key: impl Into<String>,
        models: &ModelConfig,
        http: &HttpConfig,
    ) -> Result<Self, LlmError> {
        let timeout = http.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(http.user_agent.as_str())
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            http: client,
            api_url: models.api_url.clone(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Client keyed from the variable named by `models.api_key_env`
    pub fn from_env(models: &ModelConfig, http: &HttpConfig) -> Result<Self, LlmError> {
        let key = auth::llm_api_key(&models.api_key_env)?;
        Self::new(key, models, http)
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        tracing::info!(
            model = %request.model,
            max_tokens = request.max_tokens,
            "Requesting completion"
        );

        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout))?;

        if !status.is_success() {
            tracing::error!("LLM API error {}", status);
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = parse_completion(&text)?;
        tracing::debug!(chars = content.len(), "Completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Looks good"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Looks good");
    }

    #[test]
    fn test_empty_content_is_not_missing_content() {
        let empty = r#"{"choices":[{"message":{"role":"assistant","content":""}}]}"#;
        assert_eq!(parse_completion(empty).unwrap(), "");

        let null = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(matches!(parse_completion(null), Err(LlmError::NoContent)));

        let absent = r#"{"choices":[{"message":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_completion(absent), Err(LlmError::NoContent)));

        let no_choices = r#"{"choices":[]}"#;
        assert!(matches!(parse_completion(no_choices), Err(LlmError::NoContent)));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_completion("<html>502</html>"),
            Err(LlmError::MalformedJson(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"error":"rate limited"}"#),
            Err(LlmError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_task_presets() {
        let models = ModelConfig {
            issue_triage: Some("small".to_string()),
            ..ModelConfig::default()
        };

        let triage = CompletionRequest::for_task(&models, "issue_triage", "sys", "user");
        assert_eq!(triage.model, "small");
        assert_eq!(triage.max_tokens, 512);
        assert_eq!(triage.temperature, 0.0);

        let reply = CompletionRequest::for_task(&models, "comment_response", "sys", "user");
        assert_eq!(reply.model, "llama-3.3-70b-versatile");
        assert_eq!(reply.max_tokens, 1024);
    }

    struct CannedLlm(Option<String>);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            self.0.clone().ok_or(LlmError::NoContent)
        }
    }

    #[tokio::test]
    async fn test_trait_object_usage() {
        let clients: Vec<Box<dyn LlmClient>> = vec![
            Box::new(CannedLlm(Some("answer".to_string()))),
            Box::new(CannedLlm(None)),
        ];
        let request = CompletionRequest::new("m", "sys", "user");

        assert_eq!(clients[0].complete(&request).await.unwrap(), "answer");
        assert!(clients[1].complete(&request).await.is_err());
    }
}

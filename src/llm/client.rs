//! OpenAI-compatible chat completion client.
//!
//! Works with any endpoint exposing `POST {api_base}/chat/completions`
//! (DeepSeek, OpenRouter, a LiteLLM proxy, vLLM ...).

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Default API base: DeepSeek's OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier; empty means the provider's default.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// Model that generated this response.
    pub model: String,
    /// Generated choices.
    pub choices: Vec<Choice>,
    /// Token usage statistics.
    pub usage: Usage,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice in the response.
    pub index: u32,
    /// Generated message.
    pub message: Message,
    /// Reason the generation stopped.
    pub finish_reason: String,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens generated.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// Text generation capability.
///
/// Implementations may fail or return ill-formed text; callers validate.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Sends a single-prompt request and returns the first choice's text.
///
/// The call is bounded by `timeout`; an elapsed timer is reported as
/// [`LlmError::Timeout`].
pub async fn complete(
    llm: &dyn LlmProvider,
    request: GenerationRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    let response = tokio::time::timeout(timeout, llm.generate(request))
        .await
        .map_err(|_| LlmError::Timeout {
            seconds: timeout.as_secs(),
        })??;

    response
        .first_content()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| LlmError::ParseError("No content in LLM response".to_string()))
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct ChatClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL (e.g. "https://api.deepseek.com/v1")
    /// * `api_key` - Optional bearer token
    /// * `default_model` - Model used when a request leaves it empty
    /// * `timeout` - HTTP timeout for each request
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ClientBuild(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            http_client,
        })
    }

    /// Create a client from environment variables.
    ///
    /// - `FORGE_API_BASE`: base URL (defaults to DeepSeek)
    /// - `FORGE_API_KEY` or `DEEPSEEK_API_KEY`: bearer token (optional)
    /// - `FORGE_MODEL`: default model (defaults to "deepseek-reasoner")
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("FORGE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        if api_base.trim().is_empty() {
            return Err(LlmError::MissingApiBase);
        }
        let api_key = env::var("FORGE_API_KEY")
            .or_else(|_| env::var("DEEPSEEK_API_KEY"))
            .ok();
        let default_model = env::var("FORGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(
            api_base,
            api_key,
            default_model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

// Reasoning models may return `content: null` alongside `reasoning_content`.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                if status_code == 429 {
                    return Err(LlmError::RateLimited(error_response.error.message));
                }
                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            return Err(LlmError::ApiError {
                code: status_code,
                message: error_text,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role.unwrap_or_else(|| "assistant".to_string()),
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_default(),
            })
            .collect();

        let usage = api_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        tracing::debug!(
            model = %api_response.model,
            total_tokens = usage.total_tokens,
            "Chat completion received"
        );

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(LlmError::RequestFailed("unreachable".to_string()))
        }
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::assistant("a").content, "a");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("deepseek-reasoner", vec![Message::user("hi")])
            .with_temperature(0.15)
            .with_max_tokens(2048);

        assert_eq!(request.temperature, Some(0.15));
        assert_eq!(request.max_tokens, Some(2048));
    }

    #[test]
    fn test_client_new_trims_base() {
        let client = ChatClient::new(
            "http://localhost:4000/",
            None,
            "m",
            Duration::from_secs(5),
        )
        .expect("client builds");
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "m");
        assert!(!client.has_api_key());
    }

    #[test]
    fn test_api_request_serialization() {
        let request = ApiRequest {
            model: "deepseek-reasoner".to_string(),
            messages: vec![Message::user("test")],
            temperature: Some(0.2),
            max_tokens: None,
            stream: false,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"temperature\":0.2"));
        assert!(json.contains("\"stream\":false"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_api_response_accepts_null_content() {
        let body = r#"{"id": "x", "model": "m", "choices": [
            {"index": 0, "message": {"role": "assistant", "content": null, "reasoning_content": "..."}, "finish_reason": "stop"}
        ]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).expect("parses");
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let client = ChatClient::new("http://localhost:65535", None, "m", Duration::from_secs(5))
            .expect("client builds");
        let request = GenerationRequest::new("m", vec![Message::user("test")]);
        let err = client.generate(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        let request = GenerationRequest::new("m", vec![Message::user("test")]);
        let err = complete(&SlowProvider, request, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }
}

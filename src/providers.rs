use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Model snapshot used for every call unless configured otherwise.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-2024-04-09";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

// -- Chat completion wire types ---------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    #[allow(dead_code)]
    pub role: Option<String>,
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if any.
    pub fn into_reply(self) -> Result<String, ProviderError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }
}

// -- Generation parameters --------------------------------------------------

/// Fixed generation settings shared by every call in a study run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

// -- Provider seam ----------------------------------------------------------

/// "Submit an ordered message list, receive one reply or an error."
///
/// No retry, streaming or partial output; callers surface errors as is.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "provider"
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    api_base: String,
    params: GenerationParams,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, params: GenerationParams) -> Self {
        Self::with_base(api_key, DEFAULT_API_BASE, params)
    }

    pub fn with_base(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            params,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.params.model,
            messages,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };
        debug!(model = %self.params.model, messages = messages.len(), "sending chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat completion rejected");
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        parsed.into_reply()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let p = GenerationParams::default();
        assert_eq!(p.model, "gpt-4-turbo-2024-04-09");
        assert!((p.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(p.max_tokens, 1000);
    }

    #[test]
    fn test_request_serializes_all_fields() {
        let messages = vec![ChatMessage::new("system", ""), ChatMessage::new("user", "hi")];
        let req = ChatCompletionRequest {
            model: "gpt-test",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 42,
        };
        let v: serde_json::Value = serde_json::to_value(&req).expect("serialize");
        assert_eq!(v["model"], "gpt-test");
        assert_eq!(v["max_tokens"], 42);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][0]["content"], "");
        assert_eq!(v["messages"][1]["content"], "hi");
        assert!(v.get("stream").is_none());
    }

    #[test]
    fn test_response_first_choice_is_reply() {
        let json = r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"Hello"},"finish_reason":"stop"},{"index":1,"message":{"role":"assistant","content":"Other"},"finish_reason":"stop"}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(json).expect("deser");
        assert_eq!(resp.into_reply().unwrap(), "Hello");
    }

    #[test]
    fn test_response_without_choices_is_error() {
        let resp: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("deser");
        assert!(matches!(resp.into_reply(), Err(ProviderError::EmptyResponse)));
        let resp: ChatCompletionResponse = serde_json::from_str(r#"{}"#).expect("deser");
        assert!(matches!(resp.into_reply(), Err(ProviderError::EmptyResponse)));
    }

    #[test]
    fn test_response_null_content_is_error() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"length"}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(json).expect("deser");
        assert!(matches!(resp.into_reply(), Err(ProviderError::EmptyResponse)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let p = OpenAiProvider::with_base("k", "http://localhost:9000/v1/", GenerationParams::default());
        assert_eq!(p.endpoint(), "http://localhost:9000/v1/chat/completions");
        assert_eq!(p.name(), "openai");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let p = OpenAiProvider::with_base("k", "http://127.0.0.1:9/v1", GenerationParams::default());
        let err = p.complete(&[ChatMessage::new("user", "hi")]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}

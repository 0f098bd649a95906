//! LLM Client: the single point of entry for all chat-completion calls.
//!
//! `ChatBackend` is the transport seam (one request in, raw model text out).
//! `StructuredCompletion` sits on top of it and owns schema validation and the
//! retry-until-valid loop; ranking code only ever talks to `StructuredCompletion`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

pub mod prompts;
pub mod structured;

pub use structured::{StructuredCompletion, StructuredOutput};

#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failure or timeout talking to the backend.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,

    /// The model answered, but never with output matching the target schema.
    #[error("Response did not match schema '{schema}' after {attempts} attempt(s): {last_error}")]
    SchemaValidationFailed {
        schema: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("LLM client configuration error: {0}")]
    Config(String),
}

/// One piece of the user message, in the order the model should see it.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// A `data:` or `https:` URL pointing at an image.
    ImageUrl(String),
}

/// Named JSON schema the response must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// Backend-neutral chat request: system instruction + one multimodal user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub parts: Vec<ContentPart>,
    pub schema: ResponseSchema,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends one request and returns the raw text of the model's reply.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<OpenAiMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAiMessage<'a> {
    System { content: &'a str },
    User { content: Vec<OpenAiContentPart<'a>> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

impl<'a> OpenAiRequest<'a> {
    fn from_chat(model: &'a str, request: &'a ChatRequest) -> Self {
        let content = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => OpenAiContentPart::Text { text },
                ContentPart::ImageUrl(url) => OpenAiContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                },
            })
            .collect();

        Self {
            model,
            temperature: request.temperature,
            messages: vec![
                OpenAiMessage::System {
                    content: &request.system,
                },
                OpenAiMessage::User { content },
            ],
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.schema.name,
                    schema: &request.schema.schema,
                },
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAiBackend
// ────────────────────────────────────────────────────────────────────────────

/// Chat-completions client for any OpenAI-compatible endpoint.
/// Retries transport failures, 429 and 5xx with exponential backoff.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_attempts: u32,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_attempts: config.network_retries.max(1),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = OpenAiRequest::from_chat(&self.model, request);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1).min(6)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<OpenAiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            // Reading the body can still fail in transport; decoding it is a protocol fault.
            let text = response.text().await?;
            let parsed = decode_completion(status.as_u16(), &text)?;
            if let Some(usage) = &parsed.usage {
                debug!(
                    "LLM call succeeded: schema={}, prompt_tokens={}, completion_tokens={}",
                    request.schema.name, usage.prompt_tokens, usage.completion_tokens
                );
            }
            return reply_text(parsed);
        }

        Err(last_error.unwrap_or(LlmError::EmptyContent))
    }
}

fn decode_completion(status: u16, body: &str) -> Result<OpenAiResponse, LlmError> {
    serde_json::from_str(body).map_err(|e| LlmError::Api {
        status,
        message: format!("malformed completion body: {e}"),
    })
}

/// Pulls the first choice's text out of a completion response.
/// A refusal comes back as its text so the schema layer reports it as a mismatch.
fn reply_text(response: OpenAiResponse) -> Result<String, LlmError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyContent)?
        .message;

    match (message.content, message.refusal) {
        (Some(content), _) if !content.trim().is_empty() => Ok(content),
        (_, Some(refusal)) => Ok(refusal),
        _ => Err(LlmError::EmptyContent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> ChatRequest {
        ChatRequest {
            system: "You are a grader.".to_string(),
            parts: vec![
                ContentPart::Text("Grade this.".to_string()),
                ContentPart::ImageUrl("data:image/jpeg;base64,AAA".to_string()),
                ContentPart::ImageUrl("data:image/jpeg;base64,BBB".to_string()),
            ],
            schema: ResponseSchema {
                name: "grade",
                schema: json!({"type": "object"}),
            },
            temperature: 0.0,
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let request = sample_request();
        let wire = serde_json::to_value(OpenAiRequest::from_chat("gpt-4o", &request)).unwrap();

        assert_eq!(wire["model"], "gpt-4o");
        assert_eq!(wire["temperature"], 0.0);
        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][0]["content"], "You are a grader.");
        assert_eq!(wire["messages"][1]["role"], "user");

        let content = wire["messages"][1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0], json!({"type": "text", "text": "Grade this."}));
        assert_eq!(
            content[1],
            json!({"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAA"}})
        );
        assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,BBB");

        assert_eq!(wire["response_format"]["type"], "json_schema");
        assert_eq!(wire["response_format"]["json_schema"]["name"], "grade");
        assert_eq!(
            wire["response_format"]["json_schema"]["schema"],
            json!({"type": "object"})
        );
    }

    #[test]
    fn test_reply_text_takes_first_choice() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "{\"a\":1}"}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_reply_text_surfaces_refusal() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": null, "refusal": "I can't help with that."}}]
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "I can't help with that.");
    }

    #[test]
    fn test_reply_text_empty_choices() {
        let response: OpenAiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(reply_text(response), Err(LlmError::EmptyContent)));
    }

    #[test]
    fn test_undecodable_success_body_is_api_error() {
        let err = decode_completion(200, "<html>gateway hiccup</html>").unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 200);
                assert!(message.starts_with("malformed completion body"), "{message}");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn test_success_body_without_choices_is_api_error() {
        assert!(matches!(
            decode_completion(200, r#"{"id": "cmpl-1"}"#),
            Err(LlmError::Api { .. })
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let backend = OpenAiBackend::new(&LlmConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:9999/v1/".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(5),
            network_retries: 0,
            schema_attempts: 3,
        })
        .unwrap();
        assert_eq!(backend.endpoint, "http://localhost:9999/v1/chat/completions");
        assert_eq!(backend.max_attempts, 1);
        assert_eq!(backend.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let backend = OpenAiBackend::new(&LlmConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(2),
            network_retries: 1,
            schema_attempts: 1,
        })
        .unwrap();
        let err = backend.complete(&sample_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)), "{err:?}");
    }
}

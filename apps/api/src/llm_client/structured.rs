//! Schema-constrained completions: every call names a target type, the reply is
//! parsed and validated into it, and mismatches are retried with the identical
//! request up to a fixed number of attempts.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::{ChatBackend, ChatRequest, ContentPart, LlmError, ResponseSchema};

/// A typed LLM output with a JSON schema and optional semantic checks.
pub trait StructuredOutput: DeserializeOwned + Send {
    /// Schema name sent to the backend and used in error messages.
    const NAME: &'static str;

    fn json_schema() -> Value;

    /// Checks that serde cannot express (value ranges etc.).
    /// An `Err` counts as a failed attempt, same as a parse failure.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Deterministic, retrying wrapper over a `ChatBackend`.
///
/// Network and API errors from the backend are returned immediately; only
/// replies that fail to parse or validate are retried here.
#[derive(Clone)]
pub struct StructuredCompletion {
    backend: Arc<dyn ChatBackend>,
    max_attempts: u32,
}

impl StructuredCompletion {
    /// Temperature pinned for reproducible extractions and scores.
    pub const TEMPERATURE: f32 = 0.0;

    pub fn new(backend: Arc<dyn ChatBackend>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn complete<T: StructuredOutput>(
        &self,
        system: &str,
        parts: Vec<ContentPart>,
    ) -> Result<T, LlmError> {
        let request = ChatRequest {
            system: system.to_string(),
            parts,
            schema: ResponseSchema {
                name: T::NAME,
                schema: T::json_schema(),
            },
            temperature: Self::TEMPERATURE,
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            // A blank reply counts as a failed attempt, like unparseable output.
            let outcome = match self.backend.complete(&request).await {
                Ok(raw) => parse_and_validate::<T>(&raw),
                Err(LlmError::EmptyContent) => Err(LlmError::EmptyContent.to_string()),
                Err(e) => return Err(e),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    warn!(
                        "Attempt {}/{} for schema '{}' did not validate: {}",
                        attempt,
                        self.max_attempts,
                        T::NAME,
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        Err(LlmError::SchemaValidationFailed {
            schema: T::NAME,
            attempts: self.max_attempts,
            last_error,
        })
    }
}

fn parse_and_validate<T: StructuredOutput>(raw: &str) -> Result<T, String> {
    let value: T = serde_json::from_str(strip_json_fences(raw)).map_err(|e| e.to_string())?;
    value.validate()?;
    Ok(value)
}

/// Unwraps a reply the model wrapped in a markdown code fence, with or
/// without an info string (```json, ```JSON, ...). Unfenced text is returned trimmed.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // JSON never starts with a letter, so anything alphabetic here is the info string.
    inner
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim()
}

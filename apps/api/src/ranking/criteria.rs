//! Criteria extraction: job description pages → ordered list of ranking criteria.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::document::PageImageSet;
use crate::llm_client::{LlmError, StructuredCompletion, StructuredOutput};
use crate::ranking::page_parts;
use crate::ranking::prompts::{extraction_prompt, EXTRACTION_USER};

/// Raw extraction reply. `extracted_content` is requested so the model
/// transcribes before it lists criteria; only `criteria` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub extracted_content: String,
    pub criteria: Vec<String>,
}

impl StructuredOutput for ExtractionResponse {
    const NAME: &'static str = "criteria_extraction";

    fn json_schema() -> Value {
        // Property order matters: transcription first, then criteria.
        json!({
            "type": "object",
            "properties": {
                "extracted_content": {
                    "type": "string",
                    "description": "Full text transcribed from the document pages."
                },
                "criteria": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Ranking criteria found in the transcribed content."
                }
            },
            "required": ["extracted_content", "criteria"],
            "additionalProperties": false
        })
    }
}

#[derive(Clone)]
pub struct CriteriaExtractor {
    completion: StructuredCompletion,
}

impl CriteriaExtractor {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self { completion }
    }

    /// Returns the criteria in the order the model listed them. An empty list is a valid result.
    pub async fn extract(&self, pages: &PageImageSet) -> Result<Vec<String>, LlmError> {
        let response: ExtractionResponse = self
            .completion
            .complete(&extraction_prompt(), page_parts(EXTRACTION_USER, pages))
            .await?;

        info!(
            "Extracted {} criteria from {} page(s) ({} chars transcribed)",
            response.criteria.len(),
            pages.len(),
            response.extracted_content.len()
        );
        Ok(response.criteria)
    }
}

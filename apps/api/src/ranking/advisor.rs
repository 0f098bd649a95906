//! Resume advisor: improvement suggestions for one resume against the criteria.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document::PageImageSet;
use crate::llm_client::{LlmError, StructuredCompletion, StructuredOutput};
use crate::ranking::page_parts;
use crate::ranking::prompts::{build_suggestion_prompt, SUGGESTION_USER};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakArea {
    pub skill: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSuggestions {
    pub missing_skills: Vec<String>,
    pub weak_areas: Vec<WeakArea>,
    pub format_suggestions: Vec<String>,
}

impl StructuredOutput for ResumeSuggestions {
    const NAME: &'static str = "resume_suggestions";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "missing_skills": {"type": "array", "items": {"type": "string"}},
                "weak_areas": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "skill": {"type": "string"},
                            "suggestion": {"type": "string"}
                        },
                        "required": ["skill", "suggestion"],
                        "additionalProperties": false
                    }
                },
                "format_suggestions": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["missing_skills", "weak_areas", "format_suggestions"],
            "additionalProperties": false
        })
    }
}

#[derive(Clone)]
pub struct ResumeAdvisor {
    completion: StructuredCompletion,
}

impl ResumeAdvisor {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self { completion }
    }

    pub async fn suggest(
        &self,
        criteria: &[String],
        pages: &PageImageSet,
    ) -> Result<ResumeSuggestions, LlmError> {
        self.completion
            .complete(
                &build_suggestion_prompt(criteria),
                page_parts(SUGGESTION_USER, pages),
            )
            .await
    }
}

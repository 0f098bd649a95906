//! Resume scoring: one resume's pages → per-criterion integer scores.

use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::document::PageImageSet;
use crate::llm_client::{LlmError, StructuredCompletion, StructuredOutput};
use crate::ranking::page_parts;
use crate::ranking::prompts::{build_scoring_prompt, SCORING_USER};

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 5;

/// Criterion → score, in the order the keys first appeared.
///
/// A repeated key keeps its first position and takes the later value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriterionScores(Vec<(String, i64)>);

impl CriterionScores {
    pub fn insert(&mut self, criterion: impl Into<String>, score: i64) {
        let criterion = criterion.into();
        match self.0.iter_mut().find(|(c, _)| *c == criterion) {
            Some(slot) => slot.1 = score,
            None => self.0.push((criterion, score)),
        }
    }

    pub fn get(&self, criterion: &str) -> Option<i64> {
        self.0
            .iter()
            .find(|(c, _)| c == criterion)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(c, s)| (c.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> i64 {
        self.0.iter().map(|(_, s)| s).sum()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for CriterionScores {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut scores = CriterionScores::default();
        for (criterion, score) in iter {
            scores.insert(criterion, score);
        }
        scores
    }
}

impl Serialize for CriterionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (criterion, score) in &self.0 {
            map.serialize_entry(criterion, score)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CriterionScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = CriterionScores;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of criterion to integer score")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut scores = CriterionScores::default();
                while let Some((criterion, score)) = access.next_entry::<String, i64>()? {
                    scores.insert(criterion, score);
                }
                Ok(scores)
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

/// Raw scoring reply as the model produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    #[serde(default)]
    pub candidate_name: String,
    pub scores: CriterionScores,
    #[serde(default)]
    pub total_score: i64,
}

impl StructuredOutput for ScoreResponse {
    const NAME: &'static str = "resume_score";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "candidate_name": {
                    "type": "string",
                    "description": "Candidate's full name as written on the resume, or empty."
                },
                "scores": {
                    "type": "object",
                    "description": "Each criterion, verbatim, mapped to its score.",
                    "additionalProperties": {
                        "type": "integer",
                        "minimum": MIN_SCORE,
                        "maximum": MAX_SCORE
                    }
                },
                "total_score": {
                    "type": "integer",
                    "description": "Sum of all individual scores."
                }
            },
            "required": ["candidate_name", "scores", "total_score"]
        })
    }

    /// Out-of-range scores are rejected (and so retried), never clamped.
    fn validate(&self) -> Result<(), String> {
        if self.scores.is_empty() {
            return Err("no criterion was scored".to_string());
        }

        let out_of_range: Vec<String> = self
            .scores
            .iter()
            .filter(|(_, score)| !(MIN_SCORE..=MAX_SCORE).contains(score))
            .map(|(criterion, score)| format!("'{criterion}'={score}"))
            .collect();

        if out_of_range.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "scores outside {MIN_SCORE}..={MAX_SCORE}: {}",
                out_of_range.join(", ")
            ))
        }
    }
}

/// A validated score for one resume. `total_score` always equals the sum of `scores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub candidate_name: String,
    pub scores: CriterionScores,
    pub total_score: i64,
}

impl From<ScoreResponse> for ScoreResult {
    fn from(response: ScoreResponse) -> Self {
        let total_score = response.scores.total();
        if total_score != response.total_score {
            warn!(
                "Model reported total_score={} for '{}' but scores sum to {}; using the sum",
                response.total_score, response.candidate_name, total_score
            );
        }
        Self {
            candidate_name: response.candidate_name.trim().to_string(),
            scores: response.scores,
            total_score,
        }
    }
}

#[derive(Clone)]
pub struct ResumeScorer {
    completion: StructuredCompletion,
}

impl ResumeScorer {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self { completion }
    }

    pub async fn score(
        &self,
        criteria: &[String],
        pages: &PageImageSet,
    ) -> Result<ScoreResult, LlmError> {
        let response: ScoreResponse = self
            .completion
            .complete(
                &build_scoring_prompt(criteria),
                page_parts(SCORING_USER, pages),
            )
            .await?;

        let result = ScoreResult::from(response);
        debug!(
            "Scored '{}' on {} criteria, total {}",
            result.candidate_name,
            result.scores.len(),
            result.total_score
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::{pages, ScriptedBackend};

    fn criteria() -> Vec<String> {
        vec!["Python experience".into(), "Has AWS certification".into()]
    }

    #[test]
    fn test_scores_keep_document_key_order() {
        let scores: CriterionScores =
            serde_json::from_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        let keys: Vec<&str> = scores.iter().map(|(c, _)| c).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_key_keeps_first_position_last_value() {
        let scores: CriterionScores =
            serde_json::from_str(r#"{"a": 1, "b": 2, "a": 4}"#).unwrap();
        assert_eq!(scores.iter().collect::<Vec<_>>(), [("a", 4), ("b", 2)]);
    }

    #[test]
    fn test_non_integer_score_is_rejected_by_parser() {
        assert!(serde_json::from_str::<CriterionScores>(r#"{"a": "high"}"#).is_err());
        assert!(serde_json::from_str::<CriterionScores>(r#"{"a": 3.5}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let response: ScoreResponse = serde_json::from_str(
            r#"{"candidate_name": "X", "scores": {"a": 6, "b": -1, "c": 5}, "total_score": 10}"#,
        )
        .unwrap();
        let err = response.validate().unwrap_err();
        assert!(err.contains("'a'=6"));
        assert!(err.contains("'b'=-1"));
        assert!(!err.contains("'c'"));
    }

    #[test]
    fn test_validate_rejects_empty_scores() {
        let response: ScoreResponse =
            serde_json::from_str(r#"{"candidate_name": "X", "scores": {}, "total_score": 0}"#)
                .unwrap();
        assert_eq!(response.validate().unwrap_err(), "no criterion was scored");
    }

    #[test]
    fn test_total_is_recomputed() {
        let response: ScoreResponse = serde_json::from_str(
            r#"{"candidate_name": "  Ann  ", "scores": {"a": 2, "b": 3}, "total_score": 42}"#,
        )
        .unwrap();
        let result = ScoreResult::from(response);
        assert_eq!(result.total_score, 5);
        assert_eq!(result.total_score, result.scores.total());
        assert_eq!(result.candidate_name, "Ann");
    }

    #[test]
    fn test_serialize_round_trips_order() {
        let scores: CriterionScores = [("B", 1), ("A", 2)].into_iter().collect();
        assert_eq!(serde_json::to_string(&scores).unwrap(), r#"{"B":1,"A":2}"#);
    }

    #[tokio::test]
    async fn test_score_sends_criteria_and_pages() {
        let backend = Arc::new(ScriptedBackend::always(
            r#"{"candidate_name": "Alice Lee", "scores": {"Python experience": 4, "Has AWS certification": 5}, "total_score": 9}"#,
        ));
        let scorer = ResumeScorer::new(StructuredCompletion::new(backend.clone(), 3));

        let result = scorer.score(&criteria(), &pages(&["alice-1"])).await.unwrap();

        assert_eq!(result.candidate_name, "Alice Lee");
        assert_eq!(result.scores.get("Python experience"), Some(4));
        assert_eq!(result.scores.get("Has AWS certification"), Some(5));
        assert_eq!(result.total_score, 9);

        let request = &backend.requests()[0];
        assert!(request.system.contains("- Python experience\n- Has AWS certification"));
        assert_eq!(request.schema.name, "resume_score");
        assert_eq!(request.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_out_of_range_reply_is_retried() {
        let backend = Arc::new(ScriptedBackend::sequence([
            Ok(r#"{"candidate_name": "B", "scores": {"Python experience": 9}, "total_score": 9}"#.to_string()),
            Ok(r#"{"candidate_name": "B", "scores": {"Python experience": 3}, "total_score": 3}"#.to_string()),
        ]));
        let scorer = ResumeScorer::new(StructuredCompletion::new(backend.clone(), 3));

        let result = scorer.score(&criteria(), &pages(&["b"])).await.unwrap();
        assert_eq!(result.scores.get("Python experience"), Some(3));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_repeated_scoring_is_stable() {
        let backend = Arc::new(ScriptedBackend::always(
            r#"{"candidate_name": "Alice Lee", "scores": {"Python experience": 4}, "total_score": 4}"#,
        ));
        let scorer = ResumeScorer::new(StructuredCompletion::new(backend.clone(), 3));
        let resume = pages(&["alice"]);

        let first = scorer.score(&criteria(), &resume).await.unwrap();
        let second = scorer.score(&criteria(), &resume).await.unwrap();

        assert_eq!(first, second);
        let requests = backend.requests();
        assert_eq!(requests[0], requests[1]);
    }
}

//! Batch scoring: runs the scorer over many resumes and aggregates the results
//! into a `ScoreTable` with one row per resume, in input order.

use std::collections::HashSet;

use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::info;

use crate::document::PageImageSet;
use crate::llm_client::LlmError;
use crate::ranking::scorer::{ResumeScorer, ScoreResult};

pub const CANDIDATE_COLUMN: &str = "Candidate Name";
pub const TOTAL_COLUMN: &str = "Total Score";

/// One resume to score. `identity` is the fallback candidate name.
#[derive(Debug, Clone)]
pub struct ResumeInput {
    pub identity: String,
    pub pages: PageImageSet,
}

#[derive(Debug, Error)]
#[error("Error scoring resume '{identity}': {source}")]
pub struct BatchError {
    pub identity: String,
    #[source]
    pub source: LlmError,
}

/// Scores resumes with up to `concurrency` LLM calls in flight.
///
/// Fail-fast: the first failing resume fails the batch and drops every other
/// in-flight call.
#[derive(Clone)]
pub struct BatchScorer {
    scorer: ResumeScorer,
    concurrency: usize,
}

impl BatchScorer {
    pub fn new(scorer: ResumeScorer, concurrency: usize) -> Self {
        Self {
            scorer,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn score_all(
        &self,
        criteria: &[String],
        resumes: &[ResumeInput],
    ) -> Result<ScoreTable, BatchError> {
        // Futures are created up front and polled by `buffered`, which yields
        // in input order regardless of completion order.
        let scoring: Vec<_> = resumes
            .iter()
            .map(|resume| self.score_one(criteria, resume))
            .collect();
        let results: Vec<(String, ScoreResult)> = stream::iter(scoring)
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        info!("Scored {} resume(s) against {} criteria", results.len(), criteria.len());
        Ok(ScoreTable::assemble(criteria, results))
    }

    async fn score_one(
        &self,
        criteria: &[String],
        resume: &ResumeInput,
    ) -> Result<(String, ScoreResult), BatchError> {
        match self.scorer.score(criteria, &resume.pages).await {
            Ok(result) => Ok((resume.identity.clone(), result)),
            Err(source) => Err(BatchError {
                identity: resume.identity.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub candidate_name: String,
    /// One cell per criterion column; `None` means the resume was not scored on it.
    pub cells: Vec<Option<i64>>,
    pub total_score: i64,
}

/// Candidate Name, criterion columns, Total Score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTable {
    criteria: Vec<String>,
    rows: Vec<ScoreRow>,
}

impl ScoreTable {
    /// Builds the table from `(identity, result)` pairs, keeping their order.
    ///
    /// Criterion columns are the keys present in at least one result: first
    /// those from the canonical `criteria` list in its order, then any other
    /// keys in the order they were first seen. An empty candidate name falls
    /// back to the identity.
    pub fn assemble(criteria: &[String], results: Vec<(String, ScoreResult)>) -> Self {
        let scored: HashSet<&str> = results
            .iter()
            .flat_map(|(_, result)| result.scores.iter().map(|(c, _)| c))
            .collect();

        let mut columns: Vec<String> = Vec::new();
        let mut placed: HashSet<&str> = HashSet::new();
        let canonical = criteria.iter().map(String::as_str);
        let extras = results
            .iter()
            .flat_map(|(_, result)| result.scores.iter().map(|(c, _)| c));
        for criterion in canonical.filter(|c| scored.contains(c)).chain(extras) {
            if placed.insert(criterion) {
                columns.push(criterion.to_string());
            }
        }

        let rows = results
            .iter()
            .map(|(identity, result)| ScoreRow {
                candidate_name: if result.candidate_name.trim().is_empty() {
                    identity.clone()
                } else {
                    result.candidate_name.clone()
                },
                cells: columns.iter().map(|c| result.scores.get(c)).collect(),
                total_score: result.total_score,
            })
            .collect();

        Self {
            criteria: columns,
            rows,
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        std::iter::once(CANDIDATE_COLUMN)
            .chain(self.criteria.iter().map(String::as_str))
            .chain(std::iter::once(TOTAL_COLUMN))
            .collect()
    }

    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    /// Header plus one line per row, each terminated by `\n`. Absent cells are empty.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, self.columns().into_iter().map(str::to_string));
        for row in self.rows() {
            let cells = std::iter::once(row.candidate_name.clone())
                .chain(
                    row.cells
                        .iter()
                        .map(|cell| cell.map(|s| s.to_string()).unwrap_or_default()),
                )
                .chain(std::iter::once(row.total_score.to_string()));
            push_record(&mut out, cells);
        }
        out
    }
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    let line = fields.map(|f| escape_csv(&f)).collect::<Vec<_>>().join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Quotes a field only when it contains a delimiter, quote or line break.
fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

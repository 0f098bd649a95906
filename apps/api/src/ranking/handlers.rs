//! Axum route handlers for the ranking API.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::info;

use crate::document::{Document, PageImageSet, PageRasterizer, RasterError};
use crate::errors::AppError;
use crate::ranking::advisor::{ResumeAdvisor, ResumeSuggestions};
use crate::ranking::batch::{BatchScorer, ResumeInput};
use crate::ranking::criteria::CriteriaExtractor;
use crate::ranking::scorer::ResumeScorer;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CriteriaResponse {
    pub criteria: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileSuggestions {
    pub file: String,
    #[serde(flatten)]
    pub suggestions: ResumeSuggestions,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<FileSuggestions>,
}

#[derive(Debug)]
struct Upload {
    file_name: String,
    bytes: Bytes,
}

/// Every multipart field, collected before anything is processed.
#[derive(Debug, Default)]
struct UploadForm {
    criteria: Option<String>,
    /// Parts named `file`.
    file: Vec<Upload>,
    /// Parts named `files`.
    files: Vec<Upload>,
}

impl UploadForm {
    /// The single `file` upload of /extract-criteria.
    fn single_file(self) -> Result<Upload, AppError> {
        if !self.files.is_empty() {
            return Err(AppError::MalformedInput(
                "Upload the job description as 'file', not 'files'".to_string(),
            ));
        }
        let mut uploads = self.file.into_iter();
        let upload = uploads
            .next()
            .ok_or_else(|| AppError::MalformedInput("Missing 'file' upload".to_string()))?;
        if uploads.next().is_some() {
            return Err(AppError::MalformedInput(
                "Upload exactly one job description in 'file'".to_string(),
            ));
        }
        Ok(upload)
    }

    /// The `files` uploads of the resume endpoints.
    fn resume_files(&mut self) -> Result<Vec<Upload>, AppError> {
        if !self.file.is_empty() {
            return Err(AppError::MalformedInput(
                "Upload resumes as 'files', not 'file'".to_string(),
            ));
        }
        Ok(std::mem::take(&mut self.files))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /extract-criteria
///
/// Multipart field `file`: a job description (PDF or DOCX).
pub async fn handle_extract_criteria(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CriteriaResponse>, AppError> {
    let upload = read_form(multipart).await?.single_file()?;

    let document = Document::from_upload(upload.file_name, upload.bytes)?;
    let pages = rasterize_checked(state.rasterizer.as_ref(), &document).await?;

    let criteria = CriteriaExtractor::new(state.completion.clone())
        .extract(&pages)
        .await?;

    Ok(Json(CriteriaResponse { criteria }))
}

/// POST /score-resumes
///
/// Multipart fields `criteria` (JSON list of strings) and `files` (resumes).
/// Responds with a CSV attachment, one row per file in upload order.
pub async fn handle_score_resumes(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = read_form(multipart).await?;
    let criteria = parse_criteria(form.criteria.as_deref())?;
    let documents = detect_formats(form.resume_files()?)?;
    let resumes = rasterize_all(&state, documents).await?;

    let inputs: Vec<ResumeInput> = resumes
        .into_iter()
        .map(|(document, pages)| ResumeInput {
            identity: document.stem(),
            pages,
        })
        .collect();

    let batch = BatchScorer::new(
        ResumeScorer::new(state.completion.clone()),
        state.config.scoring_concurrency,
    );
    let table = batch.score_all(&criteria, &inputs).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=resume_scores.csv",
            ),
        ],
        table.to_csv(),
    )
        .into_response())
}

/// POST /resume-suggestions
///
/// Same form as /score-resumes; returns improvement suggestions per file.
pub async fn handle_resume_suggestions(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let mut form = read_form(multipart).await?;
    let criteria = parse_criteria(form.criteria.as_deref())?;
    let documents = detect_formats(form.resume_files()?)?;
    let resumes = rasterize_all(&state, documents).await?;

    let advisor = ResumeAdvisor::new(state.completion.clone());
    let reviews: Vec<_> = resumes
        .into_iter()
        .map(|(document, pages)| review_one(&advisor, &criteria, document, pages))
        .collect();
    let suggestions: Vec<FileSuggestions> = stream::iter(reviews)
        .buffered(state.config.scoring_concurrency.max(1))
        .try_collect()
        .await?;

    Ok(Json(SuggestionsResponse { suggestions }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedInput(format!("Invalid multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "criteria" => {
                form.criteria = Some(field.text().await.map_err(|e| {
                    AppError::MalformedInput(format!("Could not read 'criteria': {e}"))
                })?);
            }
            "file" | "files" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::MalformedInput(format!("'{field_name}' part has no filename"))
                    })?;
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::MalformedInput(format!("Could not read upload {file_name}: {e}"))
                })?;
                let upload = Upload { file_name, bytes };
                if field_name == "file" {
                    form.file.push(upload);
                } else {
                    form.files.push(upload);
                }
            }
            _ => {
                // drain unknown fields
                field.bytes().await.map_err(|e| {
                    AppError::MalformedInput(format!("Could not read field '{field_name}': {e}"))
                })?;
            }
        }
    }

    Ok(form)
}

/// Criteria must be a non-empty JSON array of strings.
fn parse_criteria(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    const EXPECTED: &str = "Invalid criteria format. Must be a JSON list of strings.";

    let raw = raw.ok_or_else(|| AppError::MalformedInput("Missing 'criteria' field".to_string()))?;
    let criteria: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| AppError::MalformedInput(format!("{EXPECTED} ({e})")))?;

    if criteria.is_empty() {
        return Err(AppError::MalformedInput(format!(
            "{EXPECTED} (the list is empty)"
        )));
    }
    Ok(criteria)
}

/// Detects every upload's format before any of them is converted.
fn detect_formats(uploads: Vec<Upload>) -> Result<Vec<Document>, AppError> {
    if uploads.is_empty() {
        return Err(AppError::MalformedInput(
            "At least one file must be uploaded in 'files'".to_string(),
        ));
    }

    uploads
        .into_iter()
        .map(|upload| {
            let file_name = upload.file_name.clone();
            Document::from_upload(upload.file_name, upload.bytes).map_err(|e| {
                AppError::from(e).context(format!("Error processing file {file_name}"))
            })
        })
        .collect()
}

/// Rasterizes documents with bounded concurrency, preserving input order.
async fn rasterize_all(
    state: &AppState,
    documents: Vec<Document>,
) -> Result<Vec<(Document, PageImageSet)>, AppError> {
    let rasterizer = state.rasterizer.as_ref();
    let jobs: Vec<_> = documents
        .into_iter()
        .map(|document| rasterize_one(rasterizer, document))
        .collect();
    let resumes: Vec<(Document, PageImageSet)> = stream::iter(jobs)
        .buffered(state.config.scoring_concurrency.max(1))
        .try_collect()
        .await?;

    info!("Rasterized {} uploaded document(s)", resumes.len());
    Ok(resumes)
}

async fn rasterize_one(
    rasterizer: &dyn PageRasterizer,
    document: Document,
) -> Result<(Document, PageImageSet), AppError> {
    match rasterize_checked(rasterizer, &document).await {
        Ok(pages) => Ok((document, pages)),
        Err(e) => Err(AppError::from(e)
            .context(format!("Error processing file {}", document.file_name))),
    }
}

/// A document that renders to no pages has nothing to show the model.
async fn rasterize_checked(
    rasterizer: &dyn PageRasterizer,
    document: &Document,
) -> Result<PageImageSet, RasterError> {
    let pages = rasterizer.rasterize(document).await?;
    if pages.is_empty() {
        return Err(RasterError::ConversionFailed {
            tool: "rasterizer".to_string(),
            diagnostics: format!("{} has no pages", document.file_name),
        });
    }
    Ok(pages)
}

async fn review_one(
    advisor: &ResumeAdvisor,
    criteria: &[String],
    document: Document,
    pages: PageImageSet,
) -> Result<FileSuggestions, AppError> {
    match advisor.suggest(criteria, &pages).await {
        Ok(suggestions) => Ok(FileSuggestions {
            file: document.file_name,
            suggestions,
        }),
        Err(e) => Err(AppError::from(e)
            .context(format!("Error reviewing resume '{}'", document.file_name))),
    }
}

//! Document rasterization: turns uploaded PDF/DOCX bytes into an ordered set
//! of JPEG page images ready to embed in an LLM request.
//!
//! `AppState` holds an `Arc<dyn PageRasterizer>`; production uses
//! `PopplerRasterizer`, tests swap in a stub.

pub mod convert;
pub mod encode;
pub mod rasterizer;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use rasterizer::PopplerRasterizer;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("{tool} failed: {diagnostics}")]
    ConversionFailed {
        tool: String,
        diagnostics: String,
    },

    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// The blocking encode task panicked or was cancelled.
    #[error("Page encoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Supported upload formats, detected from the file extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Detects the format from a file name. Pure string inspection; touches no files.
    pub fn detect(file_name: &str) -> Result<Self, RasterError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "" => Err(RasterError::UnsupportedFormat("(no extension)".to_string())),
            other => Err(RasterError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }
}

/// Uploaded document bytes plus the format detected from the upload name.
/// Request-scoped; never persisted.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub format: DocumentFormat,
    pub bytes: Bytes,
}

impl Document {
    pub fn from_upload(file_name: impl Into<String>, bytes: Bytes) -> Result<Self, RasterError> {
        let file_name = file_name.into();
        let format = DocumentFormat::detect(&file_name)?;
        Ok(Self {
            file_name,
            format,
            bytes,
        })
    }

    /// File name without its extension, used as the fallback candidate identity.
    pub fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.file_name.clone())
    }
}

/// One rendered page, JPEG-encoded then base64 (standard alphabet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub base64_jpeg: String,
}

impl PageImage {
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64_jpeg)
    }
}

/// Page images in original document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageImageSet {
    pages: Vec<PageImage>,
}

impl PageImageSet {
    pub fn new(pages: Vec<PageImage>) -> Self {
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageImage> {
        self.pages.iter()
    }
}

#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, document: &Document) -> Result<PageImageSet, RasterError>;
}

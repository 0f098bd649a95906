use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use super::convert::OfficeConverter;
use super::encode::{collect_rendered_pages, encode_pages};
use super::{Document, DocumentFormat, PageImageSet, PageRasterizer, RasterError};
use crate::config::RasterConfig;

const PAGE_PREFIX: &str = "page";
const OFFICE_PROFILE_DIR: &str = "lo-profile";

/// Renders PDFs with poppler's `pdftoppm`; DOCX goes through the office converter first.
///
/// Every call works inside its own `TempDir`, removed when the call returns on
/// any path, so concurrent requests never share intermediate files.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    pdftoppm_bin: String,
    converter: OfficeConverter,
    dpi: u32,
    jpeg_quality: u8,
    scratch_dir: Option<PathBuf>,
}

impl PopplerRasterizer {
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            pdftoppm_bin: config.pdftoppm_bin.clone(),
            converter: OfficeConverter::new(config.office_converter_bin.clone()),
            dpi: config.dpi,
            jpeg_quality: config.jpeg_quality,
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    fn workdir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("resume-ranker-");
        match &self.scratch_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Renders every page of `pdf` as PNG into `out_dir`, returning paths in page order.
    async fn render_pdf(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, RasterError> {
        let output = Command::new(&self.pdftoppm_bin)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf)
            .arg(out_dir.join(PAGE_PREFIX))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.pdftoppm_failure(format!("failed to invoke {}: {e}", self.pdftoppm_bin)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.pdftoppm_failure(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let pages = collect_rendered_pages(out_dir, PAGE_PREFIX, "png")?;
        if pages.is_empty() {
            return Err(self.pdftoppm_failure("no pages rendered".to_string()));
        }
        Ok(pages)
    }

    fn pdftoppm_failure(&self, diagnostics: String) -> RasterError {
        RasterError::ConversionFailed {
            tool: self.pdftoppm_bin.clone(),
            diagnostics,
        }
    }
}

#[async_trait]
impl PageRasterizer for PopplerRasterizer {
    async fn rasterize(&self, document: &Document) -> Result<PageImageSet, RasterError> {
        let workdir = self.workdir()?;
        let input = workdir
            .path()
            .join(format!("input.{}", document.format.extension()));
        tokio::fs::write(&input, &document.bytes).await?;

        let pdf = match document.format {
            DocumentFormat::Pdf => input,
            DocumentFormat::Docx => {
                let pdf_dir = workdir.path().join("converted");
                tokio::fs::create_dir(&pdf_dir).await?;
                let profile = workdir.path().join(OFFICE_PROFILE_DIR);
                let pdf = self
                    .converter
                    .convert_to_pdf(&input, &pdf_dir, &profile)
                    .await?;
                debug!("Converted {} to intermediate PDF", document.file_name);
                pdf
            }
        };

        let render_dir = workdir.path().join("pages");
        tokio::fs::create_dir(&render_dir).await?;
        let page_paths = self.render_pdf(&pdf, &render_dir).await?;

        let quality = self.jpeg_quality;
        let pages =
            tokio::task::spawn_blocking(move || encode_pages(&page_paths, quality)).await??;

        info!(
            "Rasterized {} ({:?}) into {} page(s)",
            document.file_name,
            document.format,
            pages.len()
        );

        // `workdir` drops here, removing the input, intermediate PDF, profile and renders.
        Ok(PageImageSet::new(pages))
    }
}

//! Office document → PDF conversion via a headless LibreOffice-compatible tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::RasterError;

#[derive(Debug, Clone)]
pub struct OfficeConverter {
    bin: String,
}

impl OfficeConverter {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Converts `input` to PDF, writing `<input stem>.pdf` into `out_dir`.
    ///
    /// `profile_dir` is the user profile for this run only. Instances sharing a
    /// profile lock each other out, so concurrent conversions must each pass
    /// their own.
    ///
    /// Non-zero exit or a missing output file is reported as `ConversionFailed`
    /// carrying the tool's stderr (or stdout when stderr is empty).
    pub async fn convert_to_pdf(
        &self,
        input: &Path,
        out_dir: &Path,
        profile_dir: &Path,
    ) -> Result<PathBuf, RasterError> {
        let output = Command::new(&self.bin)
            .arg(user_installation_arg(profile_dir))
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.failure(format!("failed to invoke {}: {e}", self.bin)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} stdout: {}", self.bin, stdout.trim());

        if !output.status.success() {
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                diagnostics(&stderr, &stdout)
            )));
        }

        let stem = input
            .file_stem()
            .ok_or_else(|| self.failure("input path has no file name".to_string()))?;
        let pdf_path = out_dir.join(stem).with_extension("pdf");

        if !pdf_path.exists() {
            return Err(self.failure(format!(
                "no PDF produced at {}: {}",
                pdf_path.display(),
                diagnostics(&stderr, &stdout)
            )));
        }

        Ok(pdf_path)
    }

    fn failure(&self, diagnostics: String) -> RasterError {
        RasterError::ConversionFailed {
            tool: self.bin.clone(),
            diagnostics,
        }
    }
}

fn user_installation_arg(profile_dir: &Path) -> String {
    format!("-env:UserInstallation=file://{}", profile_dir.display())
}

fn diagnostics(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

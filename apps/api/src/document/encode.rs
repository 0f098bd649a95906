//! Page image re-encoding: any raster the renderer produced → JPEG → base64.

use std::path::{Path, PathBuf};

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;

use super::{PageImage, RasterError};

/// Re-encodes an in-memory raster image as base64 JPEG.
pub fn encode_jpeg_base64(image_bytes: &[u8], quality: u8) -> Result<PageImage, RasterError> {
    let decoded = image::load_from_memory(image_bytes)?;
    // JPEG has no alpha channel.
    let rgb = decoded.to_rgb8();

    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality))?;

    Ok(PageImage {
        base64_jpeg: base64::engine::general_purpose::STANDARD.encode(&jpeg),
    })
}

/// Reads and encodes rendered page files. Blocking; call from `spawn_blocking`.
pub fn encode_pages(paths: &[PathBuf], quality: u8) -> Result<Vec<PageImage>, RasterError> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)?;
            encode_jpeg_base64(&bytes, quality)
        })
        .collect()
}

/// Collects rendered page files named `<prefix>-<n>.<ext>` from `dir`, ordered by page number.
///
/// Renderers zero-pad the page number inconsistently across versions, so the
/// numeric suffix is parsed rather than relying on lexical order.
pub fn collect_rendered_pages(dir: &Path, prefix: &str, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                return None;
            }
            let stem = path.file_stem()?.to_str()?;
            let number = stem.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()?;
            Some((number, path))
        })
        .collect();

    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a numeric one is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub raster: RasterConfig,
    pub scoring_concurrency: usize,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

/// Settings for the chat-completion backend and the structured-output layer.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Attempts for transport failures, 429 and 5xx responses.
    pub network_retries: u32,
    /// Attempts until the model output validates against the target schema.
    pub schema_attempts: u32,
}

/// External tools and encoding settings used to turn documents into page images.
#[derive(Debug, Clone)]
pub struct RasterConfig {
    pub pdftoppm_bin: String,
    pub office_converter_bin: String,
    pub dpi: u32,
    pub jpeg_quality: u8,
    /// Parent of the per-call working directories; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            pdftoppm_bin: "pdftoppm".to_string(),
            office_converter_bin: "libreoffice".to_string(),
            dpi: 150,
            jpeg_quality: 85,
            scratch_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let raster_defaults = RasterConfig::default();
        let jpeg_quality: u8 = parse_env("JPEG_QUALITY", raster_defaults.jpeg_quality)?;
        if !(1..=100).contains(&jpeg_quality) {
            anyhow::bail!("JPEG_QUALITY must be between 1 and 100, got {jpeg_quality}");
        }

        Ok(Config {
            llm: LlmConfig {
                api_key: require_env("OPENAI_API_KEY")?,
                base_url: env_or("LLM_BASE_URL", "https://api.openai.com/v1"),
                model: env_or("LLM_MODEL", "gpt-4o"),
                timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 120u64)?),
                network_retries: parse_env("LLM_NETWORK_RETRIES", 3u32)?.max(1),
                schema_attempts: parse_env("LLM_SCHEMA_ATTEMPTS", 3u32)?.max(1),
            },
            raster: RasterConfig {
                pdftoppm_bin: env_or("PDFTOPPM_BIN", &raster_defaults.pdftoppm_bin),
                office_converter_bin: env_or(
                    "OFFICE_CONVERTER_BIN",
                    &raster_defaults.office_converter_bin,
                ),
                dpi: parse_env("RASTER_DPI", raster_defaults.dpi)?,
                jpeg_quality,
                scratch_dir: std::env::var("RASTER_SCRATCH_DIR")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from),
            },
            scoring_concurrency: parse_env("SCORING_CONCURRENCY", 4usize)?.max(1),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 25 * 1024 * 1024usize)?,
            port: parse_env("PORT", 8000u16)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

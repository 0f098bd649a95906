//! Test doubles for the two external seams: the chat backend and the rasterizer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, LlmConfig, RasterConfig};
use crate::document::{Document, PageImage, PageImageSet, PageRasterizer, RasterError};
use crate::llm_client::{ChatBackend, ChatRequest, ContentPart, LlmError};

enum Script {
    Always(String),
    Sequence(Mutex<VecDeque<Result<String, LlmError>>>),
    /// Reply chosen by which needle appears in one of the request's image URLs.
    ByImage(Vec<(String, String)>),
}

/// `ChatBackend` that answers from a script and records every request.
pub struct ScriptedBackend {
    script: Script,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self::with_script(Script::Always(reply.to_string()))
    }

    pub fn sequence(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self::with_script(Script::Sequence(Mutex::new(replies.into_iter().collect())))
    }

    pub fn by_image<'a>(replies: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::with_script(Script::ByImage(
            replies
                .into_iter()
                .map(|(needle, reply)| (needle.to_string(), reply.to_string()))
                .collect(),
        ))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());

        match &self.script {
            Script::Always(reply) => Ok(reply.clone()),
            Script::Sequence(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyContent)),
            Script::ByImage(replies) => {
                let urls: Vec<&str> = request
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::ImageUrl(url) => Some(url.as_str()),
                        ContentPart::Text(_) => None,
                    })
                    .collect();
                replies
                    .iter()
                    .find(|(needle, _)| urls.iter().any(|url| url.contains(needle.as_str())))
                    .map(|(_, reply)| reply.clone())
                    .ok_or(LlmError::EmptyContent)
            }
        }
    }
}

/// Rasterizer that yields one fake page per document whose payload is the file name,
/// so `ScriptedBackend::by_image` can route replies per upload.
#[derive(Default)]
pub struct StubRasterizer {
    /// File names that fail with `ConversionFailed`.
    pub failing: Vec<String>,
    /// File names that render to zero pages.
    pub blank: Vec<String>,
    seen: Mutex<Vec<String>>,
}

impl StubRasterizer {
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn blank_on(names: &[&str]) -> Self {
        Self {
            blank: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(&self, document: &Document) -> Result<PageImageSet, RasterError> {
        self.seen.lock().unwrap().push(document.file_name.clone());
        if self.failing.contains(&document.file_name) {
            return Err(RasterError::ConversionFailed {
                tool: "libreoffice".to_string(),
                diagnostics: "exited with exit status: 1: Error: source file could not be loaded"
                    .to_string(),
            });
        }
        if self.blank.contains(&document.file_name) {
            return Ok(PageImageSet::default());
        }
        Ok(pages(&[document.file_name.as_str()]))
    }
}

pub fn pages(payloads: &[&str]) -> PageImageSet {
    PageImageSet::new(
        payloads
            .iter()
            .map(|p| PageImage {
                base64_jpeg: p.to_string(),
            })
            .collect(),
    )
}

/// Builds a `multipart/form-data` body with the file parts first, then the text fields.
/// Returns (content type, body).
pub fn multipart_body(text_fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    const BOUNDARY: &str = "----resume-ranker-test-boundary";
    let mut body = Vec::new();

    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in text_fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Configuration for in-process tests; nothing here is ever contacted.
pub fn test_config() -> Config {
    Config {
        llm: LlmConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(5),
            network_retries: 1,
            schema_attempts: 3,
        },
        raster: RasterConfig::default(),
        scoring_concurrency: 4,
        max_upload_bytes: 1024 * 1024,
        port: 0,
        rust_log: "debug".to_string(),
    }
}

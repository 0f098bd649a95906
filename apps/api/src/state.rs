use std::sync::Arc;

use crate::config::Config;
use crate::document::PageRasterizer;
use crate::llm_client::StructuredCompletion;

/// Shared application state injected into all route handlers via Axum extractors.
/// Holds no per-request data; everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Pluggable rasterizer. Default: PopplerRasterizer.
    pub rasterizer: Arc<dyn PageRasterizer>,
    /// Schema-validated LLM access shared by every ranking component.
    pub completion: StructuredCompletion,
}

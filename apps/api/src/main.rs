mod config;
mod document;
mod errors;
mod llm_client;
mod ranking;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::document::PopplerRasterizer;
use crate::llm_client::{OpenAiBackend, StructuredCompletion};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Ranker v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM backend
    let backend = OpenAiBackend::new(&config.llm)?;
    info!(
        "LLM backend initialized (model: {}, timeout: {:?})",
        backend.model(),
        config.llm.timeout
    );
    let completion = StructuredCompletion::new(Arc::new(backend), config.llm.schema_attempts);

    // Initialize rasterizer (pdftoppm + office converter)
    let rasterizer = Arc::new(PopplerRasterizer::new(&config.raster));
    info!(
        "Rasterizer: {} at {} dpi, {} for office documents",
        config.raster.pdftoppm_bin, config.raster.dpi, config.raster.office_converter_bin
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        rasterizer,
        completion,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::ranking::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/extract-criteria", post(handlers::handle_extract_criteria))
        .route("/score-resumes", post(handlers::handle_score_resumes))
        .route(
            "/resume-suggestions",
            post(handlers::handle_resume_suggestions),
        )
        .layer(body_limit)
        .with_state(state)
}

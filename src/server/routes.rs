//! Router configuration for the benchmark server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::ws;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        // Documents
        .route("/api/documents", post(handlers::create_document))
        .route("/api/documents", get(handlers::list_documents))
        .route(
            "/api/documents/:doc_id",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        // Benchmark runs
        .route("/api/documents/:doc_id/parse", post(handlers::parse_document))
        .route(
            "/api/documents/:doc_id/cancel",
            post(handlers::cancel_document),
        )
        .route("/api/documents/:doc_id/best", get(handlers::best_engine))
        // Progress streaming
        .route("/ws/progress", get(ws::progress_socket))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

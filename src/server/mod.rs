//! HTTP and WebSocket surface for benchmark runs.
//!
//! Exposes document registration, run submission/cancellation, stored
//! results, the mid-run best-engine estimate, and a progress WebSocket
//! at `/ws/progress`.

mod handlers;
mod routes;
mod ws;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::models::EngineKind;
use crate::orchestrator::{Orchestrator, RunOptions};
use crate::progress::ProgressPublisher;
use crate::repository::PersistenceGateway;

/// Shared state for the server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub publisher: Arc<ProgressPublisher>,
    /// Engines used when a parse request does not name any.
    pub default_engines: Vec<EngineKind>,
    pub run_options: RunOptions,
}

/// Start the server on the configured address.
pub async fn serve(
    settings: &Settings,
    orchestrator: Arc<Orchestrator>,
    gateway: Arc<dyn PersistenceGateway>,
    publisher: Arc<ProgressPublisher>,
) -> anyhow::Result<()> {
    let state = AppState {
        orchestrator,
        gateway,
        publisher,
        default_engines: settings.default_engines()?,
        run_options: settings.run_options(),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

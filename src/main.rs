//! ocrbench - OCR engine benchmarking and comparison system.
//!
//! Runs multiple OCR engines against the same documents, isolates their
//! failures, and ranks them by confidence, latency, cost, and extracted
//! text length.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if ocrbench::cli::is_verbose() {
        "ocrbench=info"
    } else {
        "ocrbench=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    ocrbench::cli::run().await
}

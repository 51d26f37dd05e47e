//! CLI commands implementation.

mod bench;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::Settings;
use crate::engine::{CostModel, EngineMetadata, EngineRegistry, RemoteEngine, TesseractEngine};
use crate::models::EngineKind;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressPublisher;
use crate::repository::{PersistenceGateway, SqliteGateway};

#[derive(Parser)]
#[command(name = "ocrbench")]
#[command(about = "OCR engine benchmarking and comparison system")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path (default: <data-dir>/ocrbench.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Check which OCR engines are available
    Check,

    /// Benchmark OCR engines against a file or a directory of files
    Bench {
        /// Image/PDF file, or a directory of them
        path: PathBuf,
        /// Engines to benchmark, comma-separated (e.g. tesseract,easyocr)
        #[arg(short, long)]
        engines: Option<String>,
        /// Directory for the JSON/CSV reports (default: <data-dir>/reports)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Limit number of files when benchmarking a directory (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Start the benchmark server (REST + progress WebSocket)
    Serve {
        /// Address to bind to: HOST:PORT (default: from config)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Check => cmd_check(&settings),
        Commands::Bench {
            path,
            engines,
            output,
            limit,
        } => bench::cmd_bench(&settings, &path, engines.as_deref(), output, limit).await,
        Commands::Serve { bind } => cmd_serve(settings, bind.as_deref()).await,
    }
}

/// Build the engine registry from the configured backends.
pub fn build_registry(settings: &Settings) -> EngineRegistry {
    let mut registry = EngineRegistry::new();

    registry.register(
        EngineMetadata::new(EngineKind::Tesseract)
            .with_languages(vec![settings.language.clone()])
            .with_cost_model(CostModel::Compute),
        Arc::new(TesseractEngine::new()),
    );

    let request_timeout = Duration::from_secs(settings.engine_timeout_secs.max(1));
    let sidecars = [
        (EngineKind::EasyOcr, &settings.easyocr),
        (EngineKind::PaddleOcr, &settings.paddleocr),
        (EngineKind::Remote, &settings.remote),
    ];
    for (kind, sidecar) in sidecars {
        let Some(remote) = sidecar else { continue };
        let cost_model = remote
            .cost_per_page
            .map(CostModel::PerPage)
            .unwrap_or(CostModel::Compute);
        registry.register(
            EngineMetadata::new(kind)
                .with_languages(vec![settings.language.clone()])
                .with_cost_model(cost_model),
            Arc::new(RemoteEngine::new(
                kind,
                remote.endpoint.clone(),
                request_timeout,
            )),
        );
    }

    registry
}

/// Wire the orchestrator with the SQLite gateway from the settings.
fn build_runtime(
    settings: &Settings,
) -> anyhow::Result<(Arc<Orchestrator>, Arc<dyn PersistenceGateway>, Arc<ProgressPublisher>)> {
    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteGateway::open(&settings.database_path())?);
    let publisher = Arc::new(ProgressPublisher::new());
    let registry = Arc::new(build_registry(settings));
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        Arc::clone(&gateway),
        Arc::clone(&publisher),
        settings.scoring,
        settings.language.clone(),
    ));
    Ok((orchestrator, gateway, publisher))
}

/// Initialize the data directory and database.
async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.data_dir)?;
    std::fs::create_dir_all(settings.uploads_dir())?;
    std::fs::create_dir_all(settings.reports_dir())?;

    // Opening the gateway creates the schema.
    let _ = SqliteGateway::open(&settings.database_path())?;

    println!(
        "{} Initialized ocrbench in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    Ok(())
}

/// Report availability of every registered engine.
fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    let registry = build_registry(settings);

    for kind in registry.kinds() {
        let Some(adapter) = registry.get(kind) else {
            continue;
        };
        if adapter.is_available() {
            println!("  {} {}", style("✓").green(), kind);
        } else {
            println!(
                "  {} {} — {}",
                style("✗").red(),
                kind,
                adapter.availability_hint()
            );
        }
    }

    if settings.easyocr.is_none() {
        println!(
            "  {} easyocr not configured (set OCRBENCH_EASYOCR_URL)",
            style("!").yellow()
        );
    }
    if settings.paddleocr.is_none() {
        println!(
            "  {} paddleocr not configured (set OCRBENCH_PADDLEOCR_URL)",
            style("!").yellow()
        );
    }
    Ok(())
}

/// Start the REST + WebSocket server.
async fn cmd_serve(mut settings: Settings, bind: Option<&str>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        let (host, port) = bind
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("bind must be HOST:PORT, got {}", bind))?;
        settings.server.host = host.to_string();
        settings.server.port = port
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid port: {}", port))?;
    }

    std::fs::create_dir_all(&settings.data_dir)?;
    let (orchestrator, gateway, publisher) = build_runtime(&settings)?;
    crate::server::serve(&settings, orchestrator, gateway, publisher).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteEngineSettings;

    #[test]
    fn test_every_configured_sidecar_is_registered() {
        let settings = Settings {
            easyocr: Some(RemoteEngineSettings {
                endpoint: "http://localhost:8866/ocr".to_string(),
                cost_per_page: Some(0.002),
            }),
            remote: Some(RemoteEngineSettings {
                endpoint: "http://localhost:9000/ocr".to_string(),
                cost_per_page: None,
            }),
            ..Settings::default()
        };

        let registry = build_registry(&settings);
        assert_eq!(
            registry.kinds(),
            vec![
                EngineKind::Tesseract,
                EngineKind::EasyOcr,
                EngineKind::Remote
            ]
        );
        assert!(matches!(
            registry.metadata(EngineKind::EasyOcr).unwrap().cost_model,
            CostModel::PerPage(_)
        ));
        // No declared per-page price falls back to compute billing.
        assert!(matches!(
            registry.metadata(EngineKind::Remote).unwrap().cost_model,
            CostModel::Compute
        ));
    }
}

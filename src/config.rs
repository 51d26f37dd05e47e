//! Configuration management for ocrbench.
//!
//! Settings are resolved in three layers, later layers winning:
//! built-in defaults, an optional `ocrbench.toml` in the data directory
//! (or a path given explicitly), and `OCRBENCH_*` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::EngineKind;
use crate::orchestrator::RunOptions;
use crate::scoring::ScoringConfig;

/// Name of the per-install config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "ocrbench.toml";

/// Default SQLite database filename inside the data directory.
pub const DATABASE_FILE_NAME: &str = "ocrbench.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// HTTP endpoint of one remote OCR sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEngineSettings {
    pub endpoint: String,
    /// Declared cost per page in dollars, if the sidecar bills per page.
    #[serde(default)]
    pub cost_per_page: Option<f64>,
}

/// Settings for the HTTP/WebSocket server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

/// Top-level resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory for the database, uploads, and reports.
    pub data_dir: PathBuf,
    /// Overrides the SQLite path derived from `data_dir`.
    pub database_url: Option<String>,
    pub server: ServerSettings,
    /// OCR language code passed to adapters.
    pub language: String,
    /// Engines enabled by default when a request does not name any.
    pub engines: Vec<String>,
    /// Maximum engines recognizing concurrently within one run.
    pub concurrency_limit: usize,
    /// Per-engine recognition timeout in seconds.
    pub engine_timeout_secs: u64,
    /// Sidecar endpoint for EasyOCR, if deployed.
    pub easyocr: Option<RemoteEngineSettings>,
    /// Sidecar endpoint for PaddleOCR, if deployed.
    pub paddleocr: Option<RemoteEngineSettings>,
    /// Endpoint for a custom OCR sidecar, registered as the generic
    /// `remote` engine.
    pub remote: Option<RemoteEngineSettings>,
    pub scoring: ScoringConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
            server: ServerSettings::default(),
            language: "eng".to_string(),
            engines: vec!["tesseract".to_string()],
            concurrency_limit: 3,
            engine_timeout_secs: 120,
            easyocr: None,
            paddleocr: None,
            remote: None,
            scoring: ScoringConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings: file layer (if present) then environment layer.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match config_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = default_data_dir().join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env()?;
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(settings)
    }

    /// Environment overrides. `DATABASE_URL` is honored for parity with
    /// standard deployment tooling; everything else is `OCRBENCH_*`.
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = env::var("OCRBENCH_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(host) = env::var("OCRBENCH_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("OCRBENCH_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OCRBENCH_PORT".to_string(),
                value: port,
            })?;
        }
        if let Ok(language) = env::var("OCRBENCH_LANGUAGE") {
            self.language = language;
        }
        if let Ok(engines) = env::var("OCRBENCH_ENGINES") {
            self.engines = engines
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(limit) = env::var("OCRBENCH_CONCURRENCY") {
            self.concurrency_limit = limit.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OCRBENCH_CONCURRENCY".to_string(),
                value: limit,
            })?;
        }
        if let Ok(secs) = env::var("OCRBENCH_ENGINE_TIMEOUT_SECS") {
            self.engine_timeout_secs = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OCRBENCH_ENGINE_TIMEOUT_SECS".to_string(),
                value: secs,
            })?;
        }
        if let Ok(endpoint) = env::var("OCRBENCH_EASYOCR_URL") {
            self.easyocr = Some(RemoteEngineSettings {
                endpoint,
                cost_per_page: self.easyocr.as_ref().and_then(|e| e.cost_per_page),
            });
        }
        if let Ok(endpoint) = env::var("OCRBENCH_PADDLEOCR_URL") {
            self.paddleocr = Some(RemoteEngineSettings {
                endpoint,
                cost_per_page: self.paddleocr.as_ref().and_then(|e| e.cost_per_page),
            });
        }
        if let Ok(endpoint) = env::var("OCRBENCH_REMOTE_URL") {
            self.remote = Some(RemoteEngineSettings {
                endpoint,
                cost_per_page: self.remote.as_ref().and_then(|e| e.cost_per_page),
            });
        }
        Ok(())
    }

    /// Path of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        match &self.database_url {
            Some(url) => PathBuf::from(url.strip_prefix("sqlite://").unwrap_or(url)),
            None => self.data_dir.join(DATABASE_FILE_NAME),
        }
    }

    /// Directory documents are copied into when uploaded.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory benchmark reports are written to.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// The configured default engines, parsed and deduplicated.
    pub fn default_engines(&self) -> Result<Vec<EngineKind>, ConfigError> {
        let mut kinds = Vec::new();
        for name in &self.engines {
            let kind = EngineKind::from_str(name).ok_or_else(|| ConfigError::InvalidValue {
                key: "engines".to_string(),
                value: name.clone(),
            })?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// Run options derived from the concurrency and timeout settings.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            concurrency_limit: self.concurrency_limit.max(1),
            per_engine_timeout: Duration::from_secs(self.engine_timeout_secs.max(1)),
        }
    }
}

/// `~/Documents/ocrbench` (or `~/ocrbench` without a documents dir).
fn default_data_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocrbench")
}

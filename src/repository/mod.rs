//! Persistence gateway for documents and OCR results.
//!
//! The gateway is the single writer of durable state; the orchestrator
//! never lets two runs race to write the same document. The SQLite
//! implementation is the default; the in-memory one backs tests and
//! ephemeral serving.

mod memory;
mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Document, OcrResult};

/// Errors from the persistence layer. Fatal to a run, but retryable:
/// the submitter gets the error and the run lock is released.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Database(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Database(e.to_string())
    }
}

/// Source of durable truth for documents and their OCR results.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, GatewayError>;

    /// Insert or update a document.
    async fn save_document(&self, document: &Document) -> Result<(), GatewayError>;

    /// Delete a document and its results. Returns whether it existed.
    async fn delete_document(&self, id: &str) -> Result<bool, GatewayError>;

    /// Replace all OCR results for a document with a fresh run's set.
    /// Results from earlier runs never survive; mixing metrics across
    /// runs would corrupt the scorer's relative normalization.
    async fn replace_ocr_results(
        &self,
        document_id: &str,
        results: &[OcrResult],
    ) -> Result<(), GatewayError>;

    async fn ocr_results(&self, document_id: &str) -> Result<Vec<OcrResult>, GatewayError>;

    async fn list_documents(&self) -> Result<Vec<Document>, GatewayError>;
}

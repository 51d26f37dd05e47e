//! OCR engine adapters.
//!
//! Every backend is wrapped behind the [`EngineAdapter`] contract: given
//! a document, produce text plus confidence, or fail. The orchestrator
//! never inspects backend-specific behavior; adapters time themselves
//! and report elapsed wall time on both the success and the failure arm.
//!
//! Shipped adapters:
//! - **Tesseract**: command-line OCR, pages rendered with pdftoppm
//! - **Remote**: a generic OCR HTTP API (EasyOCR/PaddleOCR sidecars)

mod registry;
mod remote;
mod tesseract;

pub use registry::{CostModel, EngineMetadata, EngineRegistry};
pub use remote::RemoteEngine;
pub use tesseract::TesseractEngine;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{EngineKind, FileType, PageMetrics};

/// Document handed to an adapter for recognition.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub document_id: String,
    pub path: PathBuf,
    pub file_type: FileType,
    /// OCR language code (e.g. "eng", "chi_sim").
    pub language: String,
}

/// Successful recognition output.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    /// Overall confidence, 0.0 - 1.0.
    pub confidence: f64,
    /// Ordered per-page metrics; empty for single-shot engines.
    pub page_metrics: Vec<PageMetrics>,
    /// Cost in dollars as reported by the backend, if it bills per call.
    pub cost: Option<f64>,
    /// Wall time measured by the adapter.
    pub elapsed_ms: u64,
}

/// Recognition failure, with the adapter's own elapsed-time measurement.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct EngineFailure {
    pub reason: String,
    pub elapsed_ms: u64,
}

impl EngineFailure {
    pub fn new(reason: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            reason: reason.into(),
            elapsed_ms,
        }
    }
}

/// Uniform capability contract over one OCR backend.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Which engine this adapter wraps.
    fn kind(&self) -> EngineKind;

    /// Whether the backend can run (binaries installed, endpoint configured).
    fn is_available(&self) -> bool;

    /// What is needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Run recognition against one document.
    async fn recognize(&self, input: &DocumentInput) -> Result<Recognition, EngineFailure>;
}

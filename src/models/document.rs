//! Document model for OCR benchmark runs.
//!
//! A document is the unit of work: one file submitted to a set of OCR
//! engines. Its status and derived fields (searchable content, engine
//! recommendation) are mutated only by the orchestrator at defined
//! transition points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Supported input file kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Image,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "image" => Some(Self::Image),
            _ => None,
        }
    }

    /// Infer the file type from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "tiff" | "tif" | "bmp" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A document submitted for OCR benchmarking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this document.
    pub id: String,
    /// Original filename.
    pub filename: String,
    /// Input kind (PDF or image).
    pub file_type: FileType,
    /// Path to the stored file.
    pub file_path: PathBuf,
    /// Current processing status.
    pub status: DocumentStatus,
    /// Best engine's extracted text, set at run finalization.
    pub searchable_content: Option<String>,
    /// Human-readable engine recommendation, set at run finalization.
    pub recommendation: Option<String>,
    /// When the document was registered.
    pub created_at: DateTime<Utc>,
    /// When the document was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new pending document with a fresh id.
    pub fn new(filename: String, file_type: FileType, file_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            file_type,
            file_path,
            status: DocumentStatus::Pending,
            searchable_content: None,
            recommendation: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, touching `updated_at`.
    pub fn set_status(&mut self, status: DocumentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

//! Core entities: documents and per-engine OCR results.

mod document;
mod ocr_result;

pub use document::{Document, DocumentStatus, FileType};
pub use ocr_result::{EngineKind, OcrResult, PageMetrics};

//! Per-engine OCR result for one benchmark run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCR engines that can be benchmarked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Tesseract OCR via command-line.
    Tesseract,
    /// EasyOCR served over HTTP.
    EasyOcr,
    /// PaddleOCR served over HTTP.
    PaddleOcr,
    /// A generic remote OCR HTTP API.
    Remote,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::EasyOcr => "easyocr",
            EngineKind::PaddleOcr => "paddleocr",
            EngineKind::Remote => "remote",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(EngineKind::Tesseract),
            "easyocr" => Some(EngineKind::EasyOcr),
            "paddleocr" | "paddle" => Some(EngineKind::PaddleOcr),
            "remote" => Some(EngineKind::Remote),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-page confidence and word-count figures.
///
/// Empty for engines that process a document in a single shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub page_index: u32,
    /// Mean word confidence for the page, 0.0 - 1.0.
    pub confidence: f64,
    pub word_count: u32,
}

/// Outcome of one engine against one document in one run.
///
/// Invariant: `confidence_score` is present exactly when `error_message`
/// is absent. Use [`OcrResult::success`] / [`OcrResult::failure`] rather
/// than building the struct by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub engine: EngineKind,
    /// Extracted text; absent on failure.
    pub extracted_text: Option<String>,
    /// Confidence 0.0 - 1.0; present exactly when the engine succeeded.
    pub confidence_score: Option<f64>,
    /// Wall time up to success or failure, reported by the adapter.
    pub processing_time_ms: u64,
    /// Estimated cost in dollars, if a cost model applies.
    pub estimated_cost: Option<f64>,
    /// Ordered per-page metrics; empty for single-shot engines.
    pub page_metrics: Vec<PageMetrics>,
    /// Failure reason; present exactly when the engine failed.
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl OcrResult {
    /// Build a successful result.
    pub fn success(
        engine: EngineKind,
        text: String,
        confidence: f64,
        processing_time_ms: u64,
        estimated_cost: Option<f64>,
        page_metrics: Vec<PageMetrics>,
    ) -> Self {
        Self {
            engine,
            extracted_text: Some(text),
            confidence_score: Some(confidence.clamp(0.0, 1.0)),
            processing_time_ms,
            estimated_cost,
            page_metrics,
            error_message: None,
            processed_at: Utc::now(),
        }
    }

    /// Build a failed result.
    pub fn failure(engine: EngineKind, reason: String, processing_time_ms: u64) -> Self {
        Self {
            engine,
            extracted_text: None,
            confidence_score: None,
            processing_time_ms,
            estimated_cost: None,
            page_metrics: Vec::new(),
            error_message: Some(reason),
            processed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
    }

    /// Characters per second, a derived throughput figure for reports.
    pub fn chars_per_second(&self) -> f64 {
        let len = self.extracted_text.as_deref().map(str::len).unwrap_or(0);
        if self.processing_time_ms == 0 {
            return 0.0;
        }
        len as f64 / (self.processing_time_ms as f64 / 1000.0)
    }
}

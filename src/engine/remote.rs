//! Adapter for OCR backends served over HTTP.
//!
//! Covers sidecar services (EasyOCR, PaddleOCR wrappers) and hosted OCR
//! APIs alike: the document bytes are POSTed to the endpoint and the
//! response carries text, confidence, and optional per-page figures.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use super::{DocumentInput, EngineAdapter, EngineFailure, Recognition};
use crate::models::{EngineKind, PageMetrics};

/// Response schema expected from remote OCR endpoints.
#[derive(Debug, Deserialize)]
struct RemoteResponse {
    text: String,
    /// Overall confidence, 0.0 - 1.0.
    confidence: f64,
    /// Per-page figures, if the backend reports them.
    #[serde(default)]
    pages: Vec<RemotePage>,
    /// Billed cost in dollars, if the backend reports it.
    #[serde(default)]
    cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RemotePage {
    page_index: u32,
    confidence: f64,
    word_count: u32,
}

/// OCR backend reached over HTTP.
pub struct RemoteEngine {
    kind: EngineKind,
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteEngine {
    /// Create an adapter for `kind` served at `endpoint`.
    pub fn new(kind: EngineKind, endpoint: String, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            kind,
            endpoint,
            client,
        }
    }

    async fn recognize_inner(&self, input: &DocumentInput) -> Result<RemoteResponse, String> {
        let bytes = tokio::fs::read(&input.path)
            .await
            .map_err(|e| format!("read {}: {}", input.path.display(), e))?;

        debug!(
            engine = %self.kind,
            endpoint = %self.endpoint,
            size = bytes.len(),
            "sending document to remote OCR backend"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/octet-stream")
            .query(&[
                ("language", input.language.as_str()),
                ("file_type", input.file_type.as_str()),
            ])
            .body(bytes)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("backend returned {}: {}", status, body.trim()));
        }

        response
            .json::<RemoteResponse>()
            .await
            .map_err(|e| format!("malformed backend response: {}", e))
    }
}

#[async_trait::async_trait]
impl EngineAdapter for RemoteEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }

    fn availability_hint(&self) -> String {
        if self.endpoint.is_empty() {
            format!("No endpoint configured for {}", self.kind)
        } else {
            format!("{} endpoint: {}", self.kind, self.endpoint)
        }
    }

    async fn recognize(&self, input: &DocumentInput) -> Result<Recognition, EngineFailure> {
        let start = Instant::now();
        match self.recognize_inner(input).await {
            Ok(response) => {
                let page_metrics = response
                    .pages
                    .into_iter()
                    .map(|p| PageMetrics {
                        page_index: p.page_index,
                        confidence: p.confidence,
                        word_count: p.word_count,
                    })
                    .collect();
                Ok(Recognition {
                    text: response.text,
                    confidence: response.confidence,
                    page_metrics,
                    cost: response.cost,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(reason) => Err(EngineFailure::new(
                reason,
                start.elapsed().as_millis() as u64,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parse_minimal() {
        let response: RemoteResponse =
            serde_json::from_str(r#"{"text": "hi", "confidence": 0.8}"#).unwrap();
        assert_eq!(response.text, "hi");
        assert!(response.pages.is_empty());
        assert!(response.cost.is_none());
    }

    #[test]
    fn test_response_parse_full() {
        let response: RemoteResponse = serde_json::from_str(
            r#"{
                "text": "page one\n\npage two",
                "confidence": 0.91,
                "cost": 0.002,
                "pages": [
                    {"page_index": 0, "confidence": 0.94, "word_count": 120},
                    {"page_index": 1, "confidence": 0.88, "word_count": 95}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(response.pages.len(), 2);
        assert_eq!(response.cost, Some(0.002));
    }

    #[test]
    fn test_availability_requires_endpoint() {
        let engine = RemoteEngine::new(
            EngineKind::EasyOcr,
            String::new(),
            Duration::from_secs(30),
        );
        assert!(!engine.is_available());
    }
}

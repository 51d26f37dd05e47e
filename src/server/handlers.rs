//! API endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use super::AppState;
use crate::models::{Document, EngineKind, FileType};
use crate::orchestrator::OrchestratorError;
use crate::repository::GatewayError;

/// Error envelope returned by every handler.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => {
                ApiError::new(StatusCode::NOT_FOUND, format!("not found: {}", id))
            }
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::RunInProgress(_) => StatusCode::CONFLICT,
            OrchestratorError::NoActiveRun(_) | OrchestratorError::DocumentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::NoEnginesRequested | OrchestratorError::UnknownEngine(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "ocrbench" }))
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub file_path: String,
    /// Display name; defaults to the path's file name.
    pub filename: Option<String>,
}

/// Register a document for benchmarking.
pub async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = PathBuf::from(&req.file_path);
    let file_type = FileType::from_path(&path).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unsupported file type: {}", req.file_path),
        )
    })?;
    let filename = req.filename.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| req.file_path.clone())
    });

    let document = Document::new(filename, file_type, path);
    state.gateway.save_document(&document).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// List all registered documents.
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.gateway.list_documents().await?))
}

/// A document and its stored per-engine results.
pub async fn get_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .gateway
        .load_document(&doc_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("not found: {}", doc_id)))?;
    let results = state.gateway.ocr_results(&doc_id).await?;
    Ok(Json(json!({ "document": document, "results": results })))
}

/// Remove a document and its stored results. Rejected while a run is
/// in flight for it.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.orchestrator.active_run(&doc_id).is_some() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("run in progress for {}", doc_id),
        ));
    }
    if !state.gateway.delete_document(&doc_id).await? {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("not found: {}", doc_id),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ParseRequest {
    /// Engine names; omitted means the configured defaults.
    pub engines: Option<Vec<String>>,
}

/// Submit a benchmark run for a document.
///
/// The run proceeds detached; progress streams over `/ws/progress` and
/// the outcome lands in the persistence gateway.
pub async fn parse_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    body: Option<Json<ParseRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.unwrap_or_default();
    let engines = match req.engines {
        Some(names) => {
            let mut kinds = Vec::new();
            for name in &names {
                let kind = EngineKind::from_str(name).ok_or_else(|| {
                    ApiError::new(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        format!("unknown engine: {}", name),
                    )
                })?;
                kinds.push(kind);
            }
            kinds
        }
        None => state.default_engines.clone(),
    };

    let handle = state
        .orchestrator
        .submit(&doc_id, engines, state.run_options)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": handle.run_id,
            "websocket_url": "/ws/progress",
        })),
    ))
}

/// Cancel the active run for a document.
pub async fn cancel_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run_id = state.orchestrator.cancel(&doc_id)?;
    Ok(Json(json!({ "run_id": run_id, "cancelled": true })))
}

/// Best-ranked successful engine so far for an in-flight run.
pub async fn best_engine(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let best = state.orchestrator.best_so_far(&doc_id).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no ranked engine yet for {}", doc_id),
        )
    })?;
    Ok(Json(best))
}

//! SQLite persistence gateway.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{GatewayError, PersistenceGateway};
use crate::models::{Document, DocumentStatus, EngineKind, FileType, OcrResult, PageMetrics};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    status TEXT NOT NULL,
    searchable_content TEXT,
    recommendation TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ocr_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    engine TEXT NOT NULL,
    extracted_text TEXT,
    confidence_score REAL,
    processing_time_ms INTEGER NOT NULL,
    estimated_cost REAL,
    page_metrics TEXT NOT NULL DEFAULT '[]',
    error_message TEXT,
    processed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ocr_results_document
    ON ocr_results(document_id);
";

/// Durable gateway backed by a local SQLite database.
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Open (and initialize if needed) a database at `path`.
    pub fn open(path: &Path) -> Result<Self, GatewayError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self, GatewayError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, GatewayError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("connection mutex poisoned");
            f(&mut conn)
        })
        .await
        .map_err(|e| GatewayError::Database(format!("blocking task failed: {}", e)))?
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, GatewayError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GatewayError::Database(format!("bad timestamp '{}': {}", s, e)))
}

fn row_to_document(row: &Row<'_>) -> Result<Document, GatewayError> {
    let file_type: String = row.get("file_type")?;
    let status: String = row.get("status")?;
    let file_path: String = row.get("file_path")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Document {
        id: row.get("id")?,
        filename: row.get("filename")?,
        file_type: FileType::from_str(&file_type)
            .ok_or_else(|| GatewayError::Database(format!("bad file_type '{}'", file_type)))?,
        file_path: PathBuf::from(file_path),
        status: DocumentStatus::from_str(&status)
            .ok_or_else(|| GatewayError::Database(format!("bad status '{}'", status)))?,
        searchable_content: row.get("searchable_content")?,
        recommendation: row.get("recommendation")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn row_to_result(row: &Row<'_>) -> Result<OcrResult, GatewayError> {
    let engine: String = row.get("engine")?;
    let page_metrics: String = row.get("page_metrics")?;
    let processed_at: String = row.get("processed_at")?;
    let processing_time_ms: i64 = row.get("processing_time_ms")?;

    let page_metrics: Vec<PageMetrics> = serde_json::from_str(&page_metrics)
        .map_err(|e| GatewayError::Database(format!("bad page_metrics: {}", e)))?;

    Ok(OcrResult {
        engine: EngineKind::from_str(&engine)
            .ok_or_else(|| GatewayError::Database(format!("bad engine '{}'", engine)))?,
        extracted_text: row.get("extracted_text")?,
        confidence_score: row.get("confidence_score")?,
        processing_time_ms: processing_time_ms.max(0) as u64,
        estimated_cost: row.get("estimated_cost")?,
        page_metrics,
        error_message: row.get("error_message")?,
        processed_at: parse_datetime(&processed_at)?,
    })
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, GatewayError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id],
                |row| Ok(row_to_document(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn save_document(&self, document: &Document) -> Result<(), GatewayError> {
        let doc = document.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents
                     (id, filename, file_type, file_path, status,
                      searchable_content, recommendation, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     filename = excluded.filename,
                     file_type = excluded.file_type,
                     file_path = excluded.file_path,
                     status = excluded.status,
                     searchable_content = excluded.searchable_content,
                     recommendation = excluded.recommendation,
                     updated_at = excluded.updated_at",
                params![
                    doc.id,
                    doc.filename,
                    doc.file_type.as_str(),
                    doc.file_path.to_string_lossy().into_owned(),
                    doc.status.as_str(),
                    doc.searchable_content,
                    doc.recommendation,
                    doc.created_at.to_rfc3339(),
                    doc.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_document(&self, id: &str) -> Result<bool, GatewayError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn replace_ocr_results(
        &self,
        document_id: &str,
        results: &[OcrResult],
    ) -> Result<(), GatewayError> {
        let document_id = document_id.to_string();
        let results = results.to_vec();
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
                params![document_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(GatewayError::NotFound(document_id));
            }

            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM ocr_results WHERE document_id = ?1",
                params![document_id],
            )?;
            for result in &results {
                let page_metrics = serde_json::to_string(&result.page_metrics)
                    .map_err(|e| GatewayError::Database(e.to_string()))?;
                tx.execute(
                    "INSERT INTO ocr_results
                         (document_id, engine, extracted_text, confidence_score,
                          processing_time_ms, estimated_cost, page_metrics,
                          error_message, processed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        document_id,
                        result.engine.as_str(),
                        result.extracted_text,
                        result.confidence_score,
                        result.processing_time_ms as i64,
                        result.estimated_cost,
                        page_metrics,
                        result.error_message,
                        result.processed_at.to_rfc3339(),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn ocr_results(&self, document_id: &str) -> Result<Vec<OcrResult>, GatewayError> {
        let document_id = document_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM ocr_results WHERE document_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![document_id], |row| Ok(row_to_result(row)))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row??);
            }
            Ok(results)
        })
        .await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, GatewayError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM documents ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], |row| Ok(row_to_document(row)))?;
            let mut documents = Vec::new();
            for row in rows {
                documents.push(row??);
            }
            Ok(documents)
        })
        .await
    }
}

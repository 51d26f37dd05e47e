//! Benchmark run orchestration.
//!
//! Drives N independently-failing engines concurrently against one
//! document: bounded worker pool, per-engine timeout, hard failure
//! isolation, incremental scoring, ordered progress events, and a
//! single durable write at finalization. Exactly one run per document
//! id may be in flight at a time.

mod run;

pub use run::{EngineRun, EngineRunState, RunId, RunOptions, RunRegistry};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::{DocumentInput, EngineFailure, EngineRegistry, Recognition};
use crate::models::{Document, DocumentStatus, EngineKind, OcrResult};
use crate::progress::{ProgressEvent, ProgressPublisher};
use crate::repository::{GatewayError, PersistenceGateway};
use crate::scoring::{EngineSample, RankedEngine, Recommendation, ScoringConfig, Scorer};

/// Errors surfaced to run submitters.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a run is already active for document {0}")]
    RunInProgress(String),

    #[error("no active run for document {0}")]
    NoActiveRun(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("no engines requested")]
    NoEnginesRequested,

    #[error("engine {0} is not registered")]
    UnknownEngine(EngineKind),

    #[error("all engines failed for document {document_id}: {summary}")]
    AllEnginesFailed {
        document_id: String,
        summary: String,
    },

    /// Retryable: the run lock has been released when this surfaces.
    #[error("persistence error: {0}")]
    Persistence(#[from] GatewayError),

    #[error("internal orchestration error: {0}")]
    Internal(String),
}

/// Final state of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub document_id: String,
    pub status: DocumentStatus,
    /// One terminal result per requested engine.
    pub results: Vec<OcrResult>,
    /// Successful engines only, best first.
    pub ranking: Vec<RankedEngine>,
    /// Present exactly when at least one engine succeeded.
    pub recommendation: Option<Recommendation>,
}

/// Handle returned by `submit`. Dropping it detaches the run; awaiting
/// it surfaces the outcome (or the aggregate failure) to the submitter.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: RunId,
    join: JoinHandle<Result<RunOutcome, OrchestratorError>>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<RunOutcome, OrchestratorError> {
        self.join
            .await
            .map_err(|e| OrchestratorError::Internal(format!("run task failed: {}", e)))?
    }
}

/// Terminal completion of one engine's execution unit.
enum Completion {
    Success(Recognition),
    Failure(EngineFailure),
    TimedOut(u64),
    Cancelled(u64),
}

/// Shared state of one in-flight run.
struct ActiveRun {
    run_id: RunId,
    scorer: Mutex<Scorer>,
    engine_runs: Mutex<HashMap<EngineKind, EngineRun>>,
    cancel: watch::Sender<bool>,
}

/// Top-level coordinator for benchmark runs.
pub struct Orchestrator {
    registry: Arc<EngineRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
    publisher: Arc<ProgressPublisher>,
    scoring: ScoringConfig,
    /// OCR language passed to adapters.
    language: String,
    run_lock: RunRegistry,
    active: Mutex<HashMap<String, Arc<ActiveRun>>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<EngineRegistry>,
        gateway: Arc<dyn PersistenceGateway>,
        publisher: Arc<ProgressPublisher>,
        scoring: ScoringConfig,
        language: String,
    ) -> Self {
        Self {
            registry,
            gateway,
            publisher,
            scoring,
            language,
            run_lock: RunRegistry::new(),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Submit a document for a benchmark run over `engines`.
    ///
    /// Rejects the submission if a run is already active for the same
    /// document id. A fresh run replaces all prior OCR results for the
    /// document at finalization.
    pub async fn submit(
        self: &Arc<Self>,
        document_id: &str,
        engines: Vec<EngineKind>,
        options: RunOptions,
    ) -> Result<RunHandle, OrchestratorError> {
        let mut requested: Vec<EngineKind> = Vec::new();
        for engine in engines {
            if !requested.contains(&engine) {
                requested.push(engine);
            }
        }
        if requested.is_empty() {
            return Err(OrchestratorError::NoEnginesRequested);
        }
        for &engine in &requested {
            if self.registry.get(engine).is_none() {
                return Err(OrchestratorError::UnknownEngine(engine));
            }
        }

        let mut document = self
            .gateway
            .load_document(document_id)
            .await?
            .ok_or_else(|| OrchestratorError::DocumentNotFound(document_id.to_string()))?;

        let run_id = RunId::new();
        self.run_lock.try_acquire(document_id, run_id)?;

        document.set_status(DocumentStatus::Processing);
        if let Err(e) = self.gateway.save_document(&document).await {
            // Lock must be released so the submission can be retried.
            self.run_lock.release(document_id);
            return Err(e.into());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let active = Arc::new(ActiveRun {
            run_id,
            scorer: Mutex::new(Scorer::new(self.scoring, self.registry.kinds())),
            engine_runs: Mutex::new(
                requested
                    .iter()
                    .map(|&engine| (engine, EngineRun::queued(engine)))
                    .collect(),
            ),
            cancel: cancel_tx,
        });
        self.active
            .lock()
            .expect("active runs poisoned")
            .insert(document.id.clone(), Arc::clone(&active));

        info!(
            document_id = %document.id,
            run_id = %run_id,
            engines = requested.len(),
            "run submitted"
        );

        let this = Arc::clone(self);
        let join = tokio::spawn(async move {
            this.execute_run(document, requested, options, active, cancel_rx)
                .await
        });

        Ok(RunHandle { run_id, join })
    }

    /// Request document-level cancellation of the active run.
    ///
    /// Non-terminal engines are marked cancelled and the run finalizes
    /// immediately with whatever succeeded so far.
    pub fn cancel(&self, document_id: &str) -> Result<RunId, OrchestratorError> {
        let active = self
            .active
            .lock()
            .expect("active runs poisoned")
            .get(document_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NoActiveRun(document_id.to_string()))?;
        let _ = active.cancel.send(true);
        Ok(active.run_id)
    }

    /// Best successful engine so far for an in-flight run.
    pub fn best_so_far(&self, document_id: &str) -> Option<RankedEngine> {
        let active = self
            .active
            .lock()
            .expect("active runs poisoned")
            .get(document_id)
            .cloned()?;
        let scorer = active.scorer.lock().expect("scorer poisoned");
        scorer.best_so_far()
    }

    /// The run currently holding a document's lock, if any.
    pub fn active_run(&self, document_id: &str) -> Option<RunId> {
        self.run_lock.active_run(document_id)
    }

    /// Engine lifecycle states for an in-flight run.
    pub fn engine_states(&self, document_id: &str) -> Option<Vec<EngineRun>> {
        let active = self
            .active
            .lock()
            .expect("active runs poisoned")
            .get(document_id)
            .cloned()?;
        let runs = active.engine_runs.lock().expect("engine runs poisoned");
        Some(runs.values().cloned().collect())
    }

    async fn execute_run(
        &self,
        mut document: Document,
        engines: Vec<EngineKind>,
        options: RunOptions,
        active: Arc<ActiveRun>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let document_id = document.id.clone();
        let engine_count = engines.len();
        let total = engine_count as u32 + 2;

        self.publisher
            .publish(ProgressEvent::update(
                &document_id,
                "initializing",
                1,
                total,
                format!("Scheduling {} OCR engines", engine_count),
            ))
            .await;

        let semaphore = Arc::new(Semaphore::new(options.concurrency_limit.max(1)));
        let (tx, mut rx) = mpsc::channel::<(EngineKind, Completion)>(engine_count);

        for engine in engines.iter().copied() {
            let Some(adapter) = self.registry.get(engine) else {
                // Validated at submit; a racing re-registration is a failure,
                // not an abort of sibling engines.
                let _ = tx
                    .send((
                        engine,
                        Completion::Failure(EngineFailure::new("engine not registered", 0)),
                    ))
                    .await;
                continue;
            };

            let input = DocumentInput {
                document_id: document_id.clone(),
                path: document.file_path.clone(),
                file_type: document.file_type,
                language: self.language.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            let active = Arc::clone(&active);
            let tx = tx.clone();
            let mut cancel_rx = cancel_rx.clone();
            let timeout = options.per_engine_timeout;

            tokio::spawn(async move {
                let started = std::time::Instant::now();
                let work = async {
                    // Fair semaphore: permits are granted in submission order.
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Completion::Failure(EngineFailure::new(
                                "worker pool shut down",
                                0,
                            ))
                        }
                    };

                    mark_running(&active, engine, timeout);

                    match tokio::time::timeout(timeout, adapter.recognize(&input)).await {
                        Ok(Ok(recognition)) => Completion::Success(recognition),
                        Ok(Err(failure)) => Completion::Failure(failure),
                        Err(_) => Completion::TimedOut(timeout.as_millis() as u64),
                    }
                };

                let completion = tokio::select! {
                    completion = work => completion,
                    _ = cancelled(&mut cancel_rx) => {
                        Completion::Cancelled(started.elapsed().as_millis() as u64)
                    }
                };
                let _ = tx.send((engine, completion)).await;
            });
        }
        drop(tx);

        let mut results: Vec<OcrResult> = Vec::with_capacity(engine_count);
        while results.len() < engine_count {
            let Some((engine, completion)) = rx.recv().await else {
                // An execution unit panicked; record the gap as a failure
                // rather than losing the one-result-per-engine invariant.
                for &engine in engines.iter() {
                    if !results.iter().any(|r| r.engine == engine) {
                        self.record_terminal(
                            &active,
                            engine,
                            EngineRunState::Failed,
                            OcrResult::failure(engine, "engine task aborted".to_string(), 0),
                            &mut results,
                        );
                    }
                }
                break;
            };

            let (state, result) = match completion {
                Completion::Success(recognition) => {
                    let pages = recognition.page_metrics.len().max(1) as u32;
                    let cost = recognition.cost.or_else(|| {
                        self.registry
                            .metadata(engine)
                            .and_then(|m| m.cost_model.estimate(pages, recognition.elapsed_ms))
                    });
                    (
                        EngineRunState::Succeeded,
                        OcrResult::success(
                            engine,
                            recognition.text,
                            recognition.confidence,
                            recognition.elapsed_ms,
                            cost,
                            recognition.page_metrics,
                        ),
                    )
                }
                Completion::Failure(failure) => (
                    EngineRunState::Failed,
                    OcrResult::failure(engine, failure.reason, failure.elapsed_ms),
                ),
                Completion::TimedOut(elapsed_ms) => (
                    EngineRunState::TimedOut,
                    OcrResult::failure(engine, "timeout".to_string(), elapsed_ms),
                ),
                Completion::Cancelled(elapsed_ms) => (
                    EngineRunState::Cancelled,
                    OcrResult::failure(engine, "cancelled".to_string(), elapsed_ms),
                ),
            };

            let message = if result.is_success() {
                format!("{} completed in {}ms", engine, result.processing_time_ms)
            } else {
                format!(
                    "{} failed: {}",
                    engine,
                    result.error_message.as_deref().unwrap_or("unknown")
                )
            };
            self.record_terminal(&active, engine, state, result, &mut results);
            self.publisher
                .publish(ProgressEvent::update(
                    &document_id,
                    "recognizing",
                    1 + results.len() as u32,
                    total,
                    message,
                ))
                .await;
        }

        self.publisher
            .publish(ProgressEvent::update(
                &document_id,
                "finalizing",
                total,
                total,
                "Scoring engines and generating recommendation",
            ))
            .await;

        let (report, failure_summary) = {
            let scorer = active.scorer.lock().expect("scorer poisoned");
            (scorer.finalize(), scorer.failure_summary())
        };

        match &report {
            Some(report) => {
                document.searchable_content = results
                    .iter()
                    .find(|r| r.engine == report.recommendation.winner)
                    .and_then(|r| r.extracted_text.clone());
                document.recommendation = Some(report.recommendation.summary.clone());
                document.set_status(DocumentStatus::Completed);
            }
            None => {
                document.recommendation = None;
                document.set_status(DocumentStatus::Failed);
            }
        }

        // Persist before releasing the run lock; a gateway failure is
        // surfaced as retryable and must not leave the lock held.
        let persisted: Result<(), GatewayError> = async {
            self.gateway.save_document(&document).await?;
            self.gateway
                .replace_ocr_results(&document_id, &results)
                .await
        }
        .await;

        if let Err(e) = persisted {
            warn!(document_id = %document_id, error = %e, "run persistence failed");
            self.publisher
                .publish(ProgressEvent::finished(
                    &document_id,
                    false,
                    format!("Processing failed: {}", e),
                ))
                .await;
            self.finish(&document_id);
            return Err(e.into());
        }

        let success = report.is_some();
        let message = match &report {
            Some(report) => format!(
                "OCR processing completed with {} successful engines",
                report.ranking.len()
            ),
            None => format!("All engines failed: {}", failure_summary),
        };
        self.publisher
            .publish(ProgressEvent::finished(&document_id, success, message))
            .await;
        self.finish(&document_id);

        info!(
            document_id = %document_id,
            run_id = %active.run_id,
            status = document.status.as_str(),
            "run finalized"
        );

        match report {
            Some(report) => Ok(RunOutcome {
                run_id: active.run_id,
                document_id,
                status: document.status,
                results,
                ranking: report.ranking,
                recommendation: Some(report.recommendation),
            }),
            None => Err(OrchestratorError::AllEnginesFailed {
                document_id,
                summary: failure_summary,
            }),
        }
    }

    /// Record one engine's terminal state and feed the incremental scorer.
    fn record_terminal(
        &self,
        active: &ActiveRun,
        engine: EngineKind,
        state: EngineRunState,
        result: OcrResult,
        results: &mut Vec<OcrResult>,
    ) {
        {
            let mut runs = active.engine_runs.lock().expect("engine runs poisoned");
            if let Some(run) = runs.get_mut(&engine) {
                run.state = state;
            }
        }
        {
            let mut scorer = active.scorer.lock().expect("scorer poisoned");
            if result.is_success() {
                scorer.record_success(EngineSample {
                    engine,
                    confidence: result.confidence_score.unwrap_or(0.0),
                    processing_time_ms: result.processing_time_ms,
                    cost: result.estimated_cost,
                    text_length: result.extracted_text.as_deref().map(str::len).unwrap_or(0),
                });
            } else {
                scorer.record_failure(
                    engine,
                    result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                );
            }
        }
        results.push(result);
    }

    /// Drop the in-flight state and release the run lock.
    fn finish(&self, document_id: &str) {
        self.active
            .lock()
            .expect("active runs poisoned")
            .remove(document_id);
        self.run_lock.release(document_id);
    }
}

/// Mark an engine running and stamp its deadline.
fn mark_running(active: &ActiveRun, engine: EngineKind, timeout: std::time::Duration) {
    let mut runs = active.engine_runs.lock().expect("engine runs poisoned");
    if let Some(run) = runs.get_mut(&engine) {
        let now = Utc::now();
        run.state = EngineRunState::Running;
        run.started_at = Some(now);
        run.deadline = now
            .checked_add_signed(
                ChronoDuration::from_std(timeout).unwrap_or_else(|_| ChronoDuration::zero()),
            )
            .or(Some(now));
    }
}

/// Resolve once document-level cancellation has been requested.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without a cancel; never resolve.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileType, PageMetrics};
    use crate::repository::MemoryGateway;
    use std::path::PathBuf;
    use std::time::Duration;

    #[derive(Clone)]
    enum Script {
        Succeed {
            text: &'static str,
            confidence: f64,
            delay_ms: u64,
        },
        Fail {
            reason: &'static str,
        },
        Hang,
    }

    struct ScriptedAdapter {
        kind: EngineKind,
        script: Script,
    }

    #[async_trait::async_trait]
    impl crate::engine::EngineAdapter for ScriptedAdapter {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            "always available".to_string()
        }

        async fn recognize(
            &self,
            _input: &DocumentInput,
        ) -> Result<Recognition, EngineFailure> {
            match &self.script {
                Script::Succeed {
                    text,
                    confidence,
                    delay_ms,
                } => {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                    Ok(Recognition {
                        text: text.to_string(),
                        confidence: *confidence,
                        page_metrics: vec![PageMetrics {
                            page_index: 0,
                            confidence: *confidence,
                            word_count: text.split_whitespace().count() as u32,
                        }],
                        cost: None,
                        elapsed_ms: (*delay_ms).max(1),
                    })
                }
                Script::Fail { reason } => Err(EngineFailure::new(*reason, 5)),
                Script::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        gateway: Arc<MemoryGateway>,
        publisher: Arc<ProgressPublisher>,
        document_id: String,
    }

    async fn harness(scripts: Vec<(EngineKind, Script)>) -> Harness {
        let mut registry = EngineRegistry::new();
        for (kind, script) in scripts {
            registry.register(
                crate::engine::EngineMetadata::new(kind),
                Arc::new(ScriptedAdapter { kind, script }),
            );
        }
        let gateway = Arc::new(MemoryGateway::new());
        let publisher = Arc::new(ProgressPublisher::new());

        let document = Document::new(
            "scan.png".to_string(),
            FileType::Image,
            PathBuf::from("/tmp/scan.png"),
        );
        let document_id = document.id.clone();
        gateway.save_document(&document).await.unwrap();

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(registry),
            gateway.clone() as Arc<dyn PersistenceGateway>,
            publisher.clone(),
            ScoringConfig::default(),
            "eng".to_string(),
        ));
        Harness {
            orchestrator,
            gateway,
            publisher,
            document_id,
        }
    }

    #[tokio::test]
    async fn test_every_engine_yields_exactly_one_result() {
        let h = harness(vec![
            (
                EngineKind::Tesseract,
                Script::Succeed {
                    text: "hello world from tesseract",
                    confidence: 0.92,
                    delay_ms: 5,
                },
            ),
            (
                EngineKind::EasyOcr,
                Script::Succeed {
                    text: "hello world",
                    confidence: 0.85,
                    delay_ms: 10,
                },
            ),
            (
                EngineKind::PaddleOcr,
                Script::Succeed {
                    text: "hello",
                    confidence: 0.70,
                    delay_ms: 15,
                },
            ),
        ])
        .await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![
                    EngineKind::Tesseract,
                    EngineKind::EasyOcr,
                    EngineKind::PaddleOcr,
                ],
                RunOptions::default(),
            )
            .await
            .unwrap();
        let outcome = handle.wait().await.unwrap();

        assert_eq!(outcome.status, DocumentStatus::Completed);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.ranking.len(), 3);
        assert!(outcome.recommendation.is_some());

        let stored = h.gateway.ocr_results(&h.document_id).await.unwrap();
        assert_eq!(stored.len(), 3);

        let doc = h
            .gateway
            .load_document(&h.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert!(doc.recommendation.is_some());
        assert!(doc.searchable_content.is_some());
    }

    #[tokio::test]
    async fn test_one_engine_failure_does_not_abort_siblings() {
        let h = harness(vec![
            (
                EngineKind::Tesseract,
                Script::Succeed {
                    text: "readable text",
                    confidence: 0.9,
                    delay_ms: 5,
                },
            ),
            (
                EngineKind::EasyOcr,
                Script::Fail {
                    reason: "model weights missing",
                },
            ),
        ])
        .await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract, EngineKind::EasyOcr],
                RunOptions::default(),
            )
            .await
            .unwrap();
        let outcome = handle.wait().await.unwrap();

        assert_eq!(outcome.status, DocumentStatus::Completed);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.ranking.len(), 1);
        assert_eq!(outcome.ranking[0].engine, EngineKind::Tesseract);

        let failed = outcome
            .results
            .iter()
            .find(|r| r.engine == EngineKind::EasyOcr)
            .unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("model weights missing"));
        assert!(failed.confidence_score.is_none());
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let h = harness(vec![
            (EngineKind::Tesseract, Script::Hang),
            (
                EngineKind::EasyOcr,
                Script::Succeed {
                    text: "fast",
                    confidence: 0.8,
                    delay_ms: 1,
                },
            ),
        ])
        .await;

        let options = RunOptions {
            per_engine_timeout: Duration::from_millis(50),
            ..RunOptions::default()
        };
        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract, EngineKind::EasyOcr],
                options,
            )
            .await
            .unwrap();
        let outcome = handle.wait().await.unwrap();

        assert_eq!(outcome.status, DocumentStatus::Completed);
        let timed_out = outcome
            .results
            .iter()
            .find(|r| r.engine == EngineKind::Tesseract)
            .unwrap();
        assert_eq!(timed_out.error_message.as_deref(), Some("timeout"));
        assert_eq!(outcome.ranking.len(), 1);
    }

    #[tokio::test]
    async fn test_all_engines_failed_marks_document_failed() {
        let h = harness(vec![
            (
                EngineKind::Tesseract,
                Script::Fail {
                    reason: "binary not found",
                },
            ),
            (
                EngineKind::EasyOcr,
                Script::Fail {
                    reason: "connection refused",
                },
            ),
            (
                EngineKind::PaddleOcr,
                Script::Fail {
                    reason: "low resolution",
                },
            ),
        ])
        .await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![
                    EngineKind::Tesseract,
                    EngineKind::EasyOcr,
                    EngineKind::PaddleOcr,
                ],
                RunOptions::default(),
            )
            .await
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        match err {
            OrchestratorError::AllEnginesFailed { summary, .. } => {
                assert!(summary.contains("binary not found"));
                assert!(summary.contains("connection refused"));
                assert!(summary.contains("low resolution"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let doc = h
            .gateway
            .load_document(&h.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc.recommendation.is_none());

        // Every terminal failure is persisted for inspection.
        let stored = h.gateway.ocr_results(&h.document_id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|r| !r.is_success()));
    }

    #[tokio::test]
    async fn test_concurrent_submission_for_same_document_is_rejected() {
        let h = harness(vec![(EngineKind::Tesseract, Script::Hang)]).await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract],
                RunOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            h.orchestrator.active_run(&h.document_id),
            Some(handle.run_id)
        );

        let err = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract],
                RunOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::RunInProgress(_)));

        h.orchestrator.cancel(&h.document_id).unwrap();
        let outcome = handle.wait().await;
        assert!(outcome.is_err());

        // Lock released after finalization; a fresh run may start.
        assert!(h.orchestrator.active_run(&h.document_id).is_none());
        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract],
                RunOptions::default(),
            )
            .await
            .unwrap();
        h.orchestrator.cancel(&h.document_id).unwrap();
        let _ = handle.wait().await;
    }

    #[tokio::test]
    async fn test_cancellation_keeps_completed_engines() {
        let h = harness(vec![
            (
                EngineKind::Tesseract,
                Script::Succeed {
                    text: "finished before cancel",
                    confidence: 0.9,
                    delay_ms: 20,
                },
            ),
            (EngineKind::EasyOcr, Script::Hang),
        ])
        .await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract, EngineKind::EasyOcr],
                RunOptions::default(),
            )
            .await
            .unwrap();

        // Let the fast engine land before requesting cancellation.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if h.orchestrator.best_so_far(&h.document_id).is_some() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "fast engine never landed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.orchestrator.cancel(&h.document_id).unwrap();

        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.status, DocumentStatus::Completed);
        assert_eq!(outcome.ranking.len(), 1);
        assert_eq!(outcome.ranking[0].engine, EngineKind::Tesseract);

        let cancelled = outcome
            .results
            .iter()
            .find(|r| r.engine == EngineKind::EasyOcr)
            .unwrap();
        assert_eq!(cancelled.error_message.as_deref(), Some("cancelled"));
        // Wall time up to the cancellation, not a zero placeholder. The
        // sibling ran for at least 20ms before the cancel was requested.
        assert!(
            cancelled.processing_time_ms >= 10,
            "cancelled engine recorded {}ms",
            cancelled.processing_time_ms
        );
    }

    #[tokio::test]
    async fn test_recommendation_absent_while_run_in_flight() {
        let h = harness(vec![(EngineKind::Tesseract, Script::Hang)]).await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract],
                RunOptions::default(),
            )
            .await
            .unwrap();

        let doc = h
            .gateway
            .load_document(&h.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert!(doc.recommendation.is_none());

        h.orchestrator.cancel(&h.document_id).unwrap();
        let _ = handle.wait().await;
    }

    #[tokio::test]
    async fn test_resubmission_replaces_previous_results() {
        let h = harness(vec![
            (
                EngineKind::Tesseract,
                Script::Succeed {
                    text: "first text",
                    confidence: 0.9,
                    delay_ms: 1,
                },
            ),
            (
                EngineKind::EasyOcr,
                Script::Succeed {
                    text: "second text",
                    confidence: 0.8,
                    delay_ms: 1,
                },
            ),
        ])
        .await;

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract, EngineKind::EasyOcr],
                RunOptions::default(),
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();
        assert_eq!(h.gateway.ocr_results(&h.document_id).await.unwrap().len(), 2);

        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract],
                RunOptions::default(),
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let stored = h.gateway.ocr_results(&h.document_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].engine, EngineKind::Tesseract);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_engine_and_empty_request() {
        let h = harness(vec![(
            EngineKind::Tesseract,
            Script::Succeed {
                text: "x",
                confidence: 0.5,
                delay_ms: 1,
            },
        )])
        .await;

        let err = h
            .orchestrator
            .submit(&h.document_id, vec![], RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoEnginesRequested));

        let err = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Remote],
                RunOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::UnknownEngine(EngineKind::Remote)
        ));

        let err = h
            .orchestrator
            .submit("missing-doc", vec![EngineKind::Tesseract], RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_reaches_terminal_event() {
        let h = harness(vec![(
            EngineKind::Tesseract,
            Script::Succeed {
                text: "progress check",
                confidence: 0.9,
                delay_ms: 1,
            },
        )])
        .await;

        let mut sub = h.publisher.subscribe(&h.document_id).await;
        let handle = h
            .orchestrator
            .submit(
                &h.document_id,
                vec![EngineKind::Tesseract],
                RunOptions::default(),
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let mut last_percentage = -1.0;
        let mut saw_final = false;
        while let Some(event) = sub.next_event().await {
            assert!(event.percentage >= last_percentage);
            last_percentage = event.percentage;
            if event.is_final() {
                assert_eq!(event.success, Some(true));
                saw_final = true;
                break;
            }
        }
        assert!(saw_final);
    }
}

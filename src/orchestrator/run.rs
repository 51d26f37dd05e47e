//! Run-level primitives: identifiers, options, per-engine lifecycle,
//! and the per-document run lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::OrchestratorError;
use crate::models::EngineKind;

/// Identifier for one benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-run execution options.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Size of the fixed worker pool for this run. Excess engines queue
    /// in submission order.
    pub concurrency_limit: usize,
    /// Deadline for each engine's wait. Expiry marks the engine timed
    /// out; a late answer is ignored.
    pub per_engine_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            per_engine_timeout: Duration::from_secs(120),
        }
    }
}

/// Lifecycle state of a single engine within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineRunState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl EngineRunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

/// Orchestrator-private lifecycle record for one engine in one run.
/// Created at scheduling, dropped when the parent run finalizes.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub engine: EngineKind,
    pub state: EngineRunState,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
}

impl EngineRun {
    pub fn queued(engine: EngineKind) -> Self {
        Self {
            engine,
            state: EngineRunState::Queued,
            started_at: None,
            deadline: None,
        }
    }
}

/// Explicit per-document run lock.
///
/// Exactly one run may be active per document id; a concurrent
/// submission is rejected, never queued, so the scorer's per-run
/// relative normalization stays well defined.
#[derive(Default)]
pub struct RunRegistry {
    active: Mutex<HashMap<String, RunId>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a document, rejecting if a run is active.
    pub fn try_acquire(&self, document_id: &str, run_id: RunId) -> Result<(), OrchestratorError> {
        let mut active = self.active.lock().expect("run registry poisoned");
        if active.contains_key(document_id) {
            return Err(OrchestratorError::RunInProgress(document_id.to_string()));
        }
        active.insert(document_id.to_string(), run_id);
        Ok(())
    }

    /// Release the lock for a document.
    pub fn release(&self, document_id: &str) {
        let mut active = self.active.lock().expect("run registry poisoned");
        active.remove(document_id);
    }

    /// The run currently holding the lock for a document, if any.
    pub fn active_run(&self, document_id: &str) -> Option<RunId> {
        let active = self.active.lock().expect("run registry poisoned");
        active.get(document_id).copied()
    }
}

//! Persistence layer for run history and pipeline documents

pub mod documents;
#[cfg(feature = "sqlite")]
pub mod store;

pub use documents::{DocumentStore, SaveTarget, StoreError};
#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{ErrorKind, FinalState, RunResult};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub controller_id: String,

    /// Node the run started from
    pub entry: String,

    pub status: ExecutionStatus,

    /// Node the failure is attributed to
    pub failed_node: Option<String>,

    pub error_kind: Option<ErrorKind>,

    /// Trace entries recorded
    pub steps: usize,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary, replacing one with the same id
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Runs of one pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    /// Most recent runs across all pipelines, newest first
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>>;

    /// All pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(runs: &mut [RunSummary]) {
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        newest_first(&mut runs);
        Ok(runs)
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let mut runs: Vec<_> = self.runs.read().await.values().cloned().collect();
        newest_first(&mut runs);
        runs.truncate(limit);
        Ok(runs)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .runs
            .read()
            .await
            .values()
            .map(|r| r.pipeline_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a run result
pub fn create_summary(result: &RunResult) -> RunSummary {
    let (failed_node, error_kind) = match &result.final_state {
        FinalState::Failed { node, kind, .. } => (Some(node.clone()), Some(*kind)),
        FinalState::Succeeded | FinalState::Cancelled => (None, None),
    };

    RunSummary {
        run_id: result.run_id,
        pipeline_name: result.pipeline_name.clone(),
        controller_id: result.controller_id.clone(),
        entry: result.entry.clone(),
        status: result.status(),
        failed_node,
        error_kind,
        steps: result.trace.len(),
        started_at: result.started_at,
        finished_at: result.finished_at,
    }
}

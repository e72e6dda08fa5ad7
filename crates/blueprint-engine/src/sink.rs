//! Persistence sinks for completed runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::RunResult;
use crate::error::SinkError;

/// Receives every finished `RunResult`.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist(
        &self,
        automation_id: &str,
        run_id: Uuid,
        result: &RunResult,
    ) -> Result<(), SinkError>;
}

/// A persisted run.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub automation_id: String,
    pub result: RunResult,
}

/// In-memory run store keyed by run id.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, run_id: Uuid) -> Option<StoredRun> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// Runs for an automation, in no particular order.
    pub async fn runs_for(&self, automation_id: &str) -> Vec<StoredRun> {
        self.runs
            .read()
            .await
            .values()
            .filter(|r| r.automation_id == automation_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl PersistenceSink for InMemoryRunStore {
    async fn persist(
        &self,
        automation_id: &str,
        run_id: Uuid,
        result: &RunResult,
    ) -> Result<(), SinkError> {
        self.runs.write().await.insert(
            run_id,
            StoredRun {
                automation_id: automation_id.to_string(),
                result: result.clone(),
            },
        );
        Ok(())
    }
}

/// Writes each run to `{dir}/{automation_id}/{run_id}.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, automation_id: &str, run_id: Uuid) -> PathBuf {
        self.dir
            .join(sanitize(automation_id))
            .join(format!("{}.json", run_id))
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn persist(
        &self,
        automation_id: &str,
        run_id: Uuid,
        result: &RunResult,
    ) -> Result<(), SinkError> {
        let path = self.path_for(automation_id, run_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(result)?;
        tokio::fs::write(&path, content).await?;
        tracing::debug!(path = %path.display(), "Run result written");
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

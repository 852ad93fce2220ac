use crate::types::{PipelineError, PipelineRun, Result, StageName};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Persisted stage output, wrapped with the input fingerprint that
/// produced it so resumption can detect stale artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact<T> {
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub payload: T,
}

/// Hash of a stage's effective inputs. Same inputs, same key.
pub fn fingerprint(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Filesystem-backed artifact store, one directory per run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    pub fn stage_path(&self, run_id: Uuid, stage: StageName) -> PathBuf {
        self.run_dir(run_id).join(format!("{}.json", stage.as_str()))
    }

    pub async fn save_stage<T: Serialize>(
        &self,
        run_id: Uuid,
        stage: StageName,
        fingerprint: &str,
        payload: &T,
    ) -> Result<String> {
        let artifact = StoredArtifact {
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
            payload,
        };
        let path = self.stage_path(run_id, stage);
        write_json(&path, &artifact).await?;
        debug!("Saved {} artifact for run {}", stage, run_id);
        Ok(path.to_string_lossy().into_owned())
    }

    pub async fn load_stage<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        stage: StageName,
    ) -> Result<Option<StoredArtifact<T>>> {
        read_json(&self.stage_path(run_id, stage)).await
    }

    /// Returns the stored payload only when its fingerprint matches the
    /// current inputs, which is what makes re-execution idempotent.
    pub async fn load_if_current<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        stage: StageName,
        fingerprint: &str,
    ) -> Result<Option<T>> {
        match self.load_stage::<T>(run_id, stage).await? {
            Some(artifact) if artifact.fingerprint == fingerprint => Ok(Some(artifact.payload)),
            Some(_) => {
                debug!("Stale {} artifact for run {}, recomputing", stage, run_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn save_run(&self, run: &PipelineRun) -> Result<()> {
        write_json(&self.run_dir(run.id).join("run.json"), run).await
    }

    pub async fn load_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        read_json(&self.run_dir(run_id).join("run.json"))
            .await?
            .ok_or(PipelineError::RunNotFound { id: run_id })
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

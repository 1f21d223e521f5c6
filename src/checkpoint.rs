// src/checkpoint.rs
// Durable snapshots of run state, one JSON document per run id. A save either
// fully replaces the prior snapshot or leaves it intact.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::file_system::write_atomic;
use crate::state::RunState;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read checkpoint: {0}")]
    Read(#[source] std::io::Error),

    #[error("checkpoint for run '{run_id}' is not valid JSON: {source}")]
    Corrupt {
        run_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode run state: {0}")]
    Encode(#[source] serde_json::Error),
}

/// File-backed checkpoint store. Callers serialize access per run id by
/// convention; two concurrent runs must never share one.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    state_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn snapshot_path(&self, run_id: &str) -> PathBuf {
        self.state_dir.join(format!("{run_id}.json"))
    }

    /// Persist the full run state. Called after every single-file attempt.
    pub async fn save(&self, state: &RunState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(state).map_err(CheckpointError::Encode)?;
        let path = self.snapshot_path(&state.run_id);

        write_atomic(&path, &json)
            .await
            .map_err(CheckpointError::Write)?;

        debug!(
            run_id = %state.run_id,
            index = state.current_index,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Load the snapshot for a run id, or None if no run with that id has
    /// ever checkpointed.
    pub async fn load(&self, run_id: &str) -> Result<Option<RunState>, CheckpointError> {
        let path = self.snapshot_path(run_id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Read(e)),
        };

        let state = serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Corrupt {
            run_id: run_id.to_string(),
            source,
        })?;

        Ok(Some(state))
    }

    /// Remove a run's snapshot. Completed runs keep theirs by default as a
    /// historical log; this exists for explicit cleanup.
    pub async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.snapshot_path(run_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::Write(e)),
        }
    }
}

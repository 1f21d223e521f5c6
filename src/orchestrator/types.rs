// src/orchestrator/types.rs

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::CatalogError;
use crate::checkpoint::CheckpointError;
use crate::engine::RetryPolicy;
use crate::state::{RecordStatus, RunOutcome, RunState, TokenUsage};

/// Orchestrator phases. `Converting` loops on itself; `Completed` is the only
/// terminal success state, `Failed` is reserved for fatal run-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Analyzing,
    Discovering,
    Converting,
    Resuming,
    Completed,
    Failed,
}

/// Conditions that abort the whole run. Everything else is recorded per file.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("output root {path} is not writable: {source}")]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no checkpoint found for run '{0}'; nothing to resume")]
    CheckpointNotFound(String),
}

/// The five CLI-provided inputs plus the resume retry policy.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub source_lang: String,
    pub target_lang: String,
    pub run_id: String,
    pub retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub rel_path: PathBuf,
    pub error: String,
}

/// What the caller gets back when a run stops, whether it finished or was
/// cancelled at a file boundary.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub outcome: RunOutcome,
    pub cancelled: bool,
    pub failed_files: Vec<FailedFile>,
    pub usage: TokenUsage,
    pub mappings_discovered: usize,
}

impl RunSummary {
    pub fn from_state(state: &RunState, cancelled: bool) -> Self {
        let failed_files = state
            .records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
            .map(|r| FailedFile {
                rel_path: r.unit.rel_path.clone(),
                error: r.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();

        Self {
            run_id: state.run_id.clone(),
            total: state.records.len(),
            completed: state.completed,
            failed: state.failed,
            outcome: state.outcome(),
            cancelled,
            failed_files,
            usage: state.total_usage(),
            mappings_discovered: state.mappings.len(),
        }
    }

    /// 0 success, 1 all-failed or fatal, 2 partial, 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else {
            self.outcome.exit_code()
        }
    }
}

/// Written to `<output_root>/conversion_report.json` when a run completes.
#[derive(Debug, Serialize)]
pub struct ConversionReport {
    pub run_id: String,
    pub source_lang: String,
    pub target_lang: String,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcome: RunOutcome,
    pub usage: TokenUsage,
    pub failed_files: Vec<FailedFile>,
    pub records: Vec<ReportRecord>,
}

#[derive(Debug, Serialize)]
pub struct ReportRecord {
    pub rel_path: PathBuf,
    pub status: RecordStatus,
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ConversionReport {
    pub fn from_state(state: &RunState) -> Self {
        let summary = RunSummary::from_state(state, false);
        Self {
            run_id: state.run_id.clone(),
            source_lang: state.source_lang.clone(),
            target_lang: state.target_lang.clone(),
            generated_at: Utc::now(),
            total: summary.total,
            succeeded: summary.completed,
            failed: summary.failed,
            outcome: summary.outcome,
            usage: summary.usage,
            failed_files: summary.failed_files,
            records: state
                .records
                .iter()
                .map(|r| ReportRecord {
                    rel_path: r.unit.rel_path.clone(),
                    status: r.status,
                    output_path: r.output_path.clone(),
                    warnings: r.warnings.clone(),
                })
                .collect(),
        }
    }
}

/// Result of `--dry-run`: the catalog plus a rough token estimate, no
/// translator calls.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub file_count: usize,
    pub total_bytes: u64,
    pub estimated_tokens: u64,
    pub files: Vec<PathBuf>,
}

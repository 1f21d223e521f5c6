// src/state.rs
// Run state: the single unit of persistence for a conversion run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file selected for conversion. Identity is the relative path; units are
/// immutable after discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileUnit {
    pub rel_path: PathBuf,
    pub abs_path: PathBuf,
    pub size_bytes: u64,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// Provider-reported token usage for a single file conversion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One record per FileUnit. Records are appended at discovery and updated by
/// the engine; they are never deleted, which is what makes replays idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionRecord {
    pub unit: FileUnit,
    pub status: RecordStatus,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub usage: Option<TokenUsage>,
}

impl ConversionRecord {
    pub fn new(unit: FileUnit) -> Self {
        Self {
            unit,
            status: RecordStatus::Pending,
            output_path: None,
            error: None,
            warnings: Vec::new(),
            usage: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Name,
    Library,
    Module,
}

/// An association between a source-language identifier and its target-language
/// counterpart, keyed by (source, kind).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolMapping {
    pub source: String,
    pub target: String,
    pub kind: MappingKind,
}

/// Overall result classification for a finished run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Partial,
    Failure,
}

impl RunOutcome {
    /// Process exit code the CLI maps this outcome to.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Failure => 1,
            RunOutcome::Partial => 2,
        }
    }
}

/// Everything a run needs to resume exactly where it left off. Persisted by
/// the checkpoint store after every single-file attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub run_id: String,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub source_lang: String,
    pub target_lang: String,
    pub records: Vec<ConversionRecord>,
    pub mappings: Vec<SymbolMapping>,
    pub current_index: usize,
    pub completed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(
        run_id: impl Into<String>,
        source_root: &Path,
        output_root: &Path,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        units: Vec<FileUnit>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            source_root: source_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            records: units.into_iter().map(ConversionRecord::new).collect(),
            mappings: Vec::new(),
            current_index: 0,
            completed: 0,
            failed: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.records.len()
    }

    /// Success when nothing failed (an empty catalog counts as success),
    /// failure when every record failed, partial otherwise.
    pub fn outcome(&self) -> RunOutcome {
        if self.failed == 0 {
            RunOutcome::Success
        } else if self.completed == 0 {
            RunOutcome::Failure
        } else {
            RunOutcome::Partial
        }
    }

    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for record in &self.records {
            if let Some(usage) = record.usage {
                total.input_tokens += usage.input_tokens;
                total.output_tokens += usage.output_tokens;
            }
        }
        total
    }
}

// src/orchestrator/mod.rs
// Top-level state machine: analyze -> discover -> convert-loop -> terminate,
// with resume as an alternate entry straight into the convert loop.

mod types;

pub use types::*;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{self, CatalogOptions};
use crate::checkpoint::CheckpointStore;
use crate::config::RecodeConfig;
use crate::engine::{ConversionEngine, StepOutcome};
use crate::file_system::write_atomic;
use crate::llm::Translator;
use crate::state::RunState;

pub struct Orchestrator {
    config: RecodeConfig,
    params: RunParams,
    translator: Arc<dyn Translator>,
    checkpoints: CheckpointStore,
    cancel: CancellationToken,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(
        config: RecodeConfig,
        params: RunParams,
        translator: Arc<dyn Translator>,
        cancel: CancellationToken,
    ) -> Self {
        let checkpoints =
            CheckpointStore::new(params.output_root.join(&config.state_dir_name));
        Self {
            config,
            params,
            translator,
            checkpoints,
            cancel,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Fresh run: full phase sequence from analysis.
    pub async fn run(&mut self) -> Result<RunSummary, FatalError> {
        self.phase = Phase::Analyzing;
        if let Err(e) = self.analyze() {
            self.phase = Phase::Failed;
            return Err(e);
        }

        self.phase = Phase::Discovering;
        let units = match catalog::discover(
            &self.params.source_root,
            &CatalogOptions {
                language: self.params.source_lang.clone(),
                max_files: self.config.max_files,
            },
        ) {
            Ok(units) => units,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e.into());
            }
        };

        info!(
            "discovered {} file(s) to convert ({} -> {})",
            units.len(),
            self.params.source_lang,
            self.params.target_lang
        );

        let mut state = RunState::new(
            &self.params.run_id,
            &self.params.source_root,
            &self.params.output_root,
            &self.params.source_lang,
            &self.params.target_lang,
            units,
        );

        // Checkpoint the freshly discovered catalog before any conversion so
        // an interrupt during file one is already resumable.
        if let Err(e) = self.checkpoints.save(&state).await {
            self.phase = Phase::Failed;
            return Err(e.into());
        }

        let cancelled = self.convert_loop(&mut state).await?;
        self.finish(&state, cancelled).await
    }

    /// Alternate entry: load the saved state and continue at its cursor,
    /// skipping analysis and discovery.
    pub async fn resume(&mut self) -> Result<RunSummary, FatalError> {
        self.phase = Phase::Resuming;

        let mut state = match self.checkpoints.load(&self.params.run_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                self.phase = Phase::Failed;
                return Err(FatalError::CheckpointNotFound(self.params.run_id.clone()));
            }
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e.into());
            }
        };

        info!(
            "resuming run '{}' at file {}/{} ({} done, {} failed)",
            state.run_id,
            state.current_index + 1,
            state.records.len(),
            state.completed,
            state.failed
        );

        ConversionEngine::prepare_resume(&mut state, self.params.retry_policy);

        let cancelled = self.convert_loop(&mut state).await?;
        self.finish(&state, cancelled).await
    }

    /// Discover and estimate without touching the translator.
    pub fn dry_run(&mut self) -> Result<DryRunReport, FatalError> {
        self.phase = Phase::Analyzing;
        if let Err(e) = self.analyze() {
            self.phase = Phase::Failed;
            return Err(e);
        }

        self.phase = Phase::Discovering;
        let units = match catalog::discover(
            &self.params.source_root,
            &CatalogOptions {
                language: self.params.source_lang.clone(),
                max_files: self.config.max_files,
            },
        ) {
            Ok(units) => units,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e.into());
            }
        };

        let total_bytes: u64 = units.iter().map(|u| u.size_bytes).sum();
        self.phase = Phase::Completed;

        Ok(DryRunReport {
            file_count: units.len(),
            total_bytes,
            // The usual rough heuristic: about four bytes per token.
            estimated_tokens: total_bytes / 4,
            files: units.into_iter().map(|u| u.rel_path).collect(),
        })
    }

    /// Source root must be a readable directory and the output root must be
    /// creatable; both are fatal preconditions.
    fn analyze(&self) -> Result<(), FatalError> {
        let source = &self.params.source_root;
        if !source.exists() {
            return Err(crate::catalog::CatalogError::RootMissing(source.clone()).into());
        }
        if !source.is_dir() {
            return Err(crate::catalog::CatalogError::NotADirectory(source.clone()).into());
        }

        std::fs::create_dir_all(&self.params.output_root).map_err(|source| {
            FatalError::OutputRoot {
                path: self.params.output_root.clone(),
                source,
            }
        })?;

        Ok(())
    }

    /// Drive the engine until exhaustion or cancellation. Cancellation is
    /// observed at file boundaries only, after the in-flight file's outcome
    /// has been recorded and checkpointed. Returns whether it was cancelled.
    async fn convert_loop(&mut self, state: &mut RunState) -> Result<bool, FatalError> {
        self.phase = Phase::Converting;

        let mut engine = ConversionEngine::new(
            self.translator.clone(),
            self.checkpoints.clone(),
            self.config.max_file_bytes,
            state,
        );

        loop {
            let step = match engine.process_next(state).await {
                Ok(step) => step,
                Err(e) => {
                    self.phase = Phase::Failed;
                    return Err(e.into());
                }
            };

            if step == StepOutcome::Exhausted {
                return Ok(false);
            }

            if self.cancel.is_cancelled() {
                info!(
                    "interrupt received; stopping after file {}/{} (resume with --run-id {})",
                    state.current_index,
                    state.records.len(),
                    state.run_id
                );
                return Ok(true);
            }
        }
    }

    async fn finish(&mut self, state: &RunState, cancelled: bool) -> Result<RunSummary, FatalError> {
        if cancelled {
            // Not terminal: the checkpoint stays live for resumption.
            return Ok(RunSummary::from_state(state, true));
        }

        self.phase = Phase::Completed;

        let report = ConversionReport::from_state(state);
        let report_path = self.params.output_root.join("conversion_report.json");
        match serde_json::to_vec_pretty(&report) {
            Ok(json) => {
                if let Err(e) = write_atomic(&report_path, &json).await {
                    warn!("could not write {}: {}", report_path.display(), e);
                }
            }
            Err(e) => warn!("could not encode conversion report: {}", e),
        }

        let summary = RunSummary::from_state(state, false);
        info!(
            "run '{}' complete: {} succeeded, {} failed, {} mapping(s) discovered",
            summary.run_id, summary.completed, summary.failed, summary.mappings_discovered
        );

        Ok(summary)
    }
}

// src/engine.rs
// Pure sequencing logic: one record per step, strictly in catalog order.
// Per-file errors never abort the batch; only checkpoint persistence failures
// escape as fatal.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::file_system::write_atomic;
use crate::llm::{TranslationRequest, Translator};
use crate::registry::SymbolRegistry;
use crate::state::{FileUnit, RecordStatus, RunState, TokenUsage};

/// What to do with records marked `Failed` when a run is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    SkipFailed,
    RetryFailed,
}

/// Per-file completion event reported to the caller after each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Converted { rel_path: PathBuf },
    Failed { rel_path: PathBuf, error: String },
    Skipped { rel_path: PathBuf },
    Exhausted,
}

struct ConvertedFile {
    output_path: PathBuf,
    new_mappings: Vec<crate::state::SymbolMapping>,
    usage: Option<TokenUsage>,
}

pub struct ConversionEngine {
    translator: Arc<dyn Translator>,
    checkpoints: CheckpointStore,
    registry: SymbolRegistry,
    max_file_bytes: u64,
}

impl ConversionEngine {
    /// The registry is rebuilt from the state's persisted mappings, so the
    /// same constructor serves fresh runs and resumed ones.
    pub fn new(
        translator: Arc<dyn Translator>,
        checkpoints: CheckpointStore,
        max_file_bytes: u64,
        state: &RunState,
    ) -> Self {
        Self {
            translator,
            checkpoints,
            registry: SymbolRegistry::from_mappings(&state.mappings),
            max_file_bytes,
        }
    }

    /// Rewind a loaded state according to the retry policy. With
    /// `RetryFailed`, failed records become pending again and the cursor moves
    /// back to the first record that still needs work; succeeded records are
    /// never revisited.
    pub fn prepare_resume(state: &mut RunState, policy: RetryPolicy) {
        if policy != RetryPolicy::RetryFailed {
            return;
        }

        for record in &mut state.records {
            if record.status == RecordStatus::Failed {
                record.status = RecordStatus::Pending;
                record.error = None;
            }
        }

        state.current_index = state
            .records
            .iter()
            .position(|r| r.status != RecordStatus::Succeeded)
            .unwrap_or(state.records.len());

        state.completed = state
            .records
            .iter()
            .filter(|r| r.status == RecordStatus::Succeeded)
            .count();
        state.failed = state
            .records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
            .count();
    }

    /// Process the record at the cursor, advance, checkpoint. Called by the
    /// orchestrator loop until `Exhausted`.
    pub async fn process_next(
        &mut self,
        state: &mut RunState,
    ) -> Result<StepOutcome, CheckpointError> {
        if state.is_exhausted() {
            return Ok(StepOutcome::Exhausted);
        }

        let idx = state.current_index;
        let rel_path = state.records[idx].unit.rel_path.clone();

        // Already-terminal records are skipped, which is what makes replaying
        // a mid-run snapshot idempotent.
        match state.records[idx].status {
            RecordStatus::Succeeded | RecordStatus::Failed => {
                state.current_index += 1;
                state.updated_at = Utc::now();
                self.checkpoints.save(state).await?;
                return Ok(StepOutcome::Skipped { rel_path });
            }
            RecordStatus::Pending | RecordStatus::InProgress => {}
        }

        state.records[idx].status = RecordStatus::InProgress;
        let unit = state.records[idx].unit.clone();

        let total = state.records.len();
        info!("converting [{}/{}] {}", idx + 1, total, rel_path.display());

        let outcome = match self.convert_unit(&unit, state).await {
            Ok(converted) => {
                let conflicts = self.registry.merge(converted.new_mappings);
                let record = &mut state.records[idx];
                record.status = RecordStatus::Succeeded;
                record.output_path = Some(converted.output_path);
                record.usage = converted.usage;
                for conflict in &conflicts {
                    warn!("{}", conflict.describe());
                    record.warnings.push(conflict.describe());
                }
                state.mappings = self.registry.snapshot();
                state.completed += 1;
                StepOutcome::Converted { rel_path }
            }
            Err(error) => {
                warn!("conversion failed for {}: {}", rel_path.display(), error);
                let record = &mut state.records[idx];
                record.status = RecordStatus::Failed;
                record.error = Some(error.clone());
                state.failed += 1;
                StepOutcome::Failed { rel_path, error }
            }
        };

        state.current_index += 1;
        state.updated_at = Utc::now();
        self.checkpoints.save(state).await?;

        Ok(outcome)
    }

    /// One file end to end. Every error path here is per-file recoverable.
    async fn convert_unit(
        &self,
        unit: &FileUnit,
        state: &RunState,
    ) -> Result<ConvertedFile, String> {
        if unit.size_bytes > self.max_file_bytes {
            return Err(format!(
                "file too large: {} bytes (limit {})",
                unit.size_bytes, self.max_file_bytes
            ));
        }

        let content = tokio::fs::read_to_string(&unit.abs_path)
            .await
            .map_err(|e| format!("failed to read source: {e}"))?;

        let request = TranslationRequest {
            rel_path: unit.rel_path.clone(),
            content,
            source_lang: state.source_lang.clone(),
            target_lang: state.target_lang.clone(),
            context: self.registry.snapshot(),
        };

        let translated = self
            .translator
            .translate(request)
            .await
            .map_err(|e| format!("translation failed: {e}"))?;

        let output_path = state
            .output_root
            .join(&unit.rel_path)
            .with_extension(target_extension(&state.target_lang));

        write_atomic(&output_path, translated.content.as_bytes())
            .await
            .map_err(|e| format!("failed to write output: {e}"))?;

        Ok(ConvertedFile {
            output_path,
            new_mappings: translated.new_mappings,
            usage: translated.usage,
        })
    }
}

/// Conventional extension for a target language. Total: unknown languages get
/// a neutral extension rather than an error.
pub fn target_extension(lang: &str) -> &'static str {
    match lang.to_ascii_lowercase().as_str() {
        "python" => "py",
        "javascript" => "js",
        "typescript" => "ts",
        "java" => "java",
        "go" => "go",
        "rust" => "rs",
        "c" => "c",
        "cpp" => "cpp",
        "csharp" => "cs",
        "ruby" => "rb",
        "php" => "php",
        "swift" => "swift",
        "kotlin" => "kt",
        _ => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{TranslateError, TranslatedUnit};
    use crate::state::{MappingKind, SymbolMapping};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Translator double: fails any file whose name contains "bad", reports
    /// one configurable mapping per call, and counts invocations.
    struct ScriptedTranslator {
        calls: AtomicUsize,
        mapping: Option<SymbolMapping>,
    }

    impl ScriptedTranslator {
        fn new(mapping: Option<SymbolMapping>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                mapping,
            }
        }
    }

    #[async_trait]
    impl Translator for ScriptedTranslator {
        async fn translate(
            &self,
            req: TranslationRequest,
        ) -> Result<TranslatedUnit, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if req.rel_path.to_string_lossy().contains("bad") {
                return Err(TranslateError::MalformedResponse("scripted failure".into()));
            }
            Ok(TranslatedUnit {
                content: format!("// converted from {}\n", req.rel_path.display()),
                new_mappings: self.mapping.clone().into_iter().collect(),
                usage: Some(TokenUsage {
                    input_tokens: 100,
                    output_tokens: 50,
                }),
            })
        }
    }

    fn fixture(files: &[(&str, &str)]) -> (TempDir, TempDir, RunState) {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        let mut units = Vec::new();
        for (rel, content) in files {
            let abs = source.path().join(rel);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
            units.push(FileUnit {
                rel_path: PathBuf::from(rel),
                abs_path: abs,
                size_bytes: content.len() as u64,
                language: "python".to_string(),
            });
        }
        units.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        let state = RunState::new(
            "test-run",
            source.path(),
            output.path(),
            "python",
            "javascript",
            units,
        );
        (source, output, state)
    }

    fn engine_for(
        translator: Arc<ScriptedTranslator>,
        store_dir: &Path,
        state: &RunState,
    ) -> ConversionEngine {
        ConversionEngine::new(
            translator,
            CheckpointStore::new(store_dir),
            100_000,
            state,
        )
    }

    async fn drain(engine: &mut ConversionEngine, state: &mut RunState) {
        loop {
            match engine.process_next(state).await.unwrap() {
                StepOutcome::Exhausted => break,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn partial_failure_completes_the_batch() {
        let (_src, out, mut state) = fixture(&[
            ("a.py", "a = 1\n"),
            ("b.py", "b = 2\n"),
            ("c_bad.py", "c = 3\n"),
            ("d.py", "d = 4\n"),
            ("e.py", "e = 5\n"),
        ]);
        let store = TempDir::new().unwrap();
        let translator = Arc::new(ScriptedTranslator::new(None));
        let mut engine = engine_for(translator.clone(), store.path(), &state);

        drain(&mut engine, &mut state).await;

        assert!(state.is_exhausted());
        assert_eq!(state.completed, 4);
        assert_eq!(state.failed, 1);
        for rel in ["a.js", "b.js", "d.js", "e.js"] {
            assert!(out.path().join(rel).exists(), "{rel} missing");
        }
        assert!(!out.path().join("c_bad.js").exists());

        let bad = state
            .records
            .iter()
            .find(|r| r.unit.rel_path.to_string_lossy().contains("bad"))
            .unwrap();
        assert_eq!(bad.status, RecordStatus::Failed);
        assert!(bad.error.as_deref().unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn succeeded_records_are_never_retranslated() {
        let (_src, _out, mut state) = fixture(&[("a.py", "a = 1\n"), ("b.py", "b = 2\n")]);
        let store = TempDir::new().unwrap();
        let translator = Arc::new(ScriptedTranslator::new(None));

        // First pass converts both files.
        let mut engine = engine_for(translator.clone(), store.path(), &state);
        drain(&mut engine, &mut state).await;
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);

        // Replaying a mid-run snapshot: reset the cursor, keep statuses.
        state.current_index = 0;
        let mut engine = engine_for(translator.clone(), store.path(), &state);
        drain(&mut engine, &mut state).await;

        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.completed, 2);
    }

    #[tokio::test]
    async fn oversize_file_fails_without_invoking_translator() {
        let (_src, _out, mut state) = fixture(&[("big.py", "x = 1\n")]);
        state.records[0].unit.size_bytes = 1_000_000;

        let store = TempDir::new().unwrap();
        let translator = Arc::new(ScriptedTranslator::new(None));
        let mut engine = engine_for(translator.clone(), store.path(), &state);

        drain(&mut engine, &mut state).await;

        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.failed, 1);
        let error = state.records[0].error.as_deref().unwrap();
        assert!(error.contains("file too large"));
    }

    #[tokio::test]
    async fn conflicting_mapping_becomes_record_warning() {
        let (_src, _out, mut state) = fixture(&[("a.py", "a = 1\n"), ("b.py", "b = 2\n")]);
        state.mappings.push(SymbolMapping {
            source: "foo".to_string(),
            target: "bar".to_string(),
            kind: MappingKind::Name,
        });

        let store = TempDir::new().unwrap();
        let translator = Arc::new(ScriptedTranslator::new(Some(SymbolMapping {
            source: "foo".to_string(),
            target: "baz".to_string(),
            kind: MappingKind::Name,
        })));
        let mut engine = engine_for(translator, store.path(), &state);

        drain(&mut engine, &mut state).await;

        // First write wins: the pre-seeded mapping survives.
        assert_eq!(state.mappings.len(), 1);
        assert_eq!(state.mappings[0].target, "bar");
        for record in &state.records {
            assert_eq!(record.warnings.len(), 1);
            assert!(record.warnings[0].contains("conflict"));
        }
    }

    #[tokio::test]
    async fn prepare_resume_default_leaves_failures_alone() {
        let (_src, _out, mut state) = fixture(&[("a.py", "a\n"), ("b_bad.py", "b\n"), ("c.py", "c\n")]);
        let store = TempDir::new().unwrap();
        let translator = Arc::new(ScriptedTranslator::new(None));
        let mut engine = engine_for(translator.clone(), store.path(), &state);
        drain(&mut engine, &mut state).await;

        ConversionEngine::prepare_resume(&mut state, RetryPolicy::SkipFailed);
        assert!(state.is_exhausted());
        assert_eq!(state.failed, 1);
    }

    #[tokio::test]
    async fn prepare_resume_retry_rewinds_to_first_failure() {
        let (_src, _out, mut state) = fixture(&[("a.py", "a\n"), ("b_bad.py", "b\n"), ("c.py", "c\n")]);
        let store = TempDir::new().unwrap();
        let translator = Arc::new(ScriptedTranslator::new(None));
        let mut engine = engine_for(translator.clone(), store.path(), &state);
        drain(&mut engine, &mut state).await;
        assert_eq!(state.failed, 1);

        ConversionEngine::prepare_resume(&mut state, RetryPolicy::RetryFailed);
        assert_eq!(state.current_index, 1);
        assert_eq!(state.failed, 0);
        assert_eq!(state.records[1].status, RecordStatus::Pending);
        assert_eq!(state.records[0].status, RecordStatus::Succeeded);
    }

    #[test]
    fn target_extensions_are_total() {
        assert_eq!(target_extension("javascript"), "js");
        assert_eq!(target_extension("TypeScript"), "ts");
        assert_eq!(target_extension("fortran"), "txt");
    }
}

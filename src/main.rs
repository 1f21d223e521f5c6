// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use recode::config::RecodeConfig;
use recode::engine::RetryPolicy;
use recode::llm::AnthropicTranslator;
use recode::orchestrator::{Orchestrator, RunParams, RunSummary};

#[derive(Parser)]
#[command(name = "recode")]
#[command(about = "Convert a codebase between programming languages using an LLM", long_about = None)]
struct Cli {
    /// Source directory containing code to convert
    source: PathBuf,

    /// Output directory for converted code
    output: PathBuf,

    /// Source language
    #[arg(long = "from", short = 'f', default_value = "python")]
    from_lang: String,

    /// Target language
    #[arg(long = "to", short = 't', default_value = "javascript")]
    to_lang: String,

    /// Run identifier for checkpointing (reuse the same id to resume)
    #[arg(long)]
    run_id: Option<String>,

    /// Resume the run identified by --run-id from its checkpoint
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// On resume, retry files that previously failed instead of skipping them
    #[arg(long, default_value_t = false)]
    retry_failed: bool,

    /// Cap on the number of files converted in one run
    #[arg(long)]
    max_files: Option<usize>,

    /// Discover files and estimate token usage without converting anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let mut config = RecodeConfig::from_env();
    if let Some(max_files) = cli.max_files {
        config.max_files = max_files;
    }

    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let params = RunParams {
        source_root: cli.source.clone(),
        output_root: cli.output.clone(),
        source_lang: cli.from_lang.to_lowercase(),
        target_lang: cli.to_lang.to_lowercase(),
        run_id: run_id.clone(),
        retry_policy: if cli.retry_failed {
            RetryPolicy::RetryFailed
        } else {
            RetryPolicy::SkipFailed
        },
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; finishing the current file before stopping");
                cancel.cancel();
            }
        });
    }

    if cli.dry_run {
        // No translator needed; discovery and estimation only.
        let mut orchestrator = Orchestrator::new(
            config,
            params,
            Arc::new(NoopTranslator),
            cancel,
        );
        let report = orchestrator.dry_run()?;
        info!(
            "dry run: {} file(s), {} bytes, ~{} input tokens",
            report.file_count, report.total_bytes, report.estimated_tokens
        );
        for rel in &report.files {
            info!("  {}", rel.display());
        }
        return Ok(());
    }

    let translator = Arc::new(AnthropicTranslator::new(&config)?);

    info!(
        "starting conversion: {} -> {} (run id: {})",
        params.source_lang, params.target_lang, run_id
    );
    info!("source: {}", params.source_root.display());
    info!("output: {}", params.output_root.display());

    let mut orchestrator = Orchestrator::new(config, params, translator, cancel);

    let summary = if cli.resume {
        orchestrator.resume().await
    } else {
        orchestrator.run().await
    };

    match summary {
        Ok(summary) => {
            print_summary(&summary);
            std::process::exit(summary.exit_code());
        }
        Err(e) => {
            error!("fatal: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if summary.cancelled {
        info!(
            "interrupted after {}/{} file(s); resume with --resume --run-id {}",
            summary.completed + summary.failed,
            summary.total,
            summary.run_id
        );
        return;
    }

    info!(
        "conversion complete: {} succeeded, {} failed (of {})",
        summary.completed, summary.failed, summary.total
    );
    info!(
        "tokens used: {} in / {} out",
        summary.usage.input_tokens, summary.usage.output_tokens
    );
    for failed in &summary.failed_files {
        info!("  failed: {} - {}", failed.rel_path.display(), failed.error);
    }
}

/// Stand-in for `--dry-run`, which never invokes the translator.
struct NoopTranslator;

#[async_trait::async_trait]
impl recode::llm::Translator for NoopTranslator {
    async fn translate(
        &self,
        _req: recode::llm::TranslationRequest,
    ) -> Result<recode::llm::TranslatedUnit, recode::llm::TranslateError> {
        Err(recode::llm::TranslateError::MalformedResponse(
            "dry run translator should never be invoked".to_string(),
        ))
    }
}

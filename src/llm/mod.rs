// src/llm/mod.rs
// The translation collaborator: a pure, replaceable function from one source
// file plus accumulated context to translated content plus new mappings.

mod anthropic;

pub use anthropic::AnthropicTranslator;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::state::{MappingKind, SymbolMapping, TokenUsage};

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,

    #[error("provider error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limited after {0} attempts")]
    RateLimited(u32),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

/// One file's worth of input to the translator. `context` is an immutable
/// registry snapshot taken when the conversion began.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub rel_path: PathBuf,
    pub content: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: Vec<SymbolMapping>,
}

#[derive(Debug, Clone)]
pub struct TranslatedUnit {
    pub content: String,
    pub new_mappings: Vec<SymbolMapping>,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, req: TranslationRequest) -> Result<TranslatedUnit, TranslateError>;
}

// ============================================================================
// Prompt assembly
// ============================================================================

pub(crate) fn system_prompt(source_lang: &str, target_lang: &str) -> String {
    format!(
        "You are an expert code converter. You convert {source_lang} code to {target_lang}.\n\
         Rules:\n\
         1. Preserve the exact functionality and logic.\n\
         2. Use idiomatic {target_lang} patterns and conventions.\n\
         3. Convert comments and docstrings appropriately.\n\
         4. Reuse every previously established name and library mapping you are given.\n\
         \n\
         Respond with exactly two fenced blocks:\n\
         first a ```{target_lang} block containing the COMPLETE converted file,\n\
         then a ```json block of the form\n\
         {{\"mappings\": [{{\"source\": \"...\", \"target\": \"...\", \"kind\": \"name|library|module\"}}]}}\n\
         listing only mappings you introduced in this file."
    )
}

pub(crate) fn user_prompt(req: &TranslationRequest) -> String {
    let mut prompt = String::new();

    if !req.context.is_empty() {
        prompt.push_str("Previously established mappings (reuse these exactly):\n");
        for mapping in &req.context {
            prompt.push_str(&format!(
                "- {:?} '{}' -> '{}'\n",
                mapping.kind, mapping.source, mapping.target
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Convert this file ({}) from {} to {}:\n\n```{}\n{}\n```",
        req.rel_path.display(),
        req.source_lang,
        req.target_lang,
        req.source_lang,
        req.content
    ));

    prompt
}

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct MappingsEnvelope {
    #[serde(default)]
    mappings: Vec<WireMapping>,
}

#[derive(Debug, Deserialize)]
struct WireMapping {
    source: String,
    target: String,
    #[serde(default)]
    kind: Option<String>,
}

impl WireMapping {
    /// The model sometimes reports the original converter's finer-grained
    /// categories; fold them onto the three kinds the registry keys on.
    fn into_mapping(self) -> SymbolMapping {
        let kind = match self.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("library") | Some("import") | Some("package") => MappingKind::Library,
            Some("module") => MappingKind::Module,
            _ => MappingKind::Name,
        };
        SymbolMapping {
            source: self.source,
            target: self.target,
            kind,
        }
    }
}

/// Split the model's reply into translated content and reported mappings.
/// The first non-json fenced block is the file; a ```json block carries the
/// mappings. A fenceless reply is treated as bare file content.
pub(crate) fn parse_translation(
    text: &str,
) -> Result<(String, Vec<SymbolMapping>), TranslateError> {
    let blocks = fenced_blocks(text);

    if blocks.is_empty() {
        let bare = text.trim();
        if bare.is_empty() {
            return Err(TranslateError::MalformedResponse(
                "empty model response".to_string(),
            ));
        }
        return Ok((bare.to_string(), Vec::new()));
    }

    let content = blocks
        .iter()
        .find(|(info, _)| info != "json")
        .map(|(_, body)| body.clone())
        .ok_or_else(|| {
            TranslateError::MalformedResponse("response contains no code block".to_string())
        })?;

    let mappings = blocks
        .iter()
        .find(|(info, _)| info == "json")
        .map(|(_, body)| match serde_json::from_str::<MappingsEnvelope>(body) {
            Ok(envelope) => envelope
                .mappings
                .into_iter()
                .map(WireMapping::into_mapping)
                .collect(),
            Err(e) => {
                debug!("ignoring unparseable mappings block: {e}");
                Vec::new()
            }
        })
        .unwrap_or_default();

    Ok((content, mappings))
}

/// Collect (info-string, body) for every triple-backtick fence in the text.
fn fenced_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            match current.take() {
                Some((info, body)) => blocks.push((info, body.join("\n"))),
                None => current = Some((rest.trim().to_ascii_lowercase(), Vec::new())),
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    // An unterminated fence still counts; the model ran out of tokens mid-file
    // and the engine surfaces that as a per-file failure downstream.
    if let Some((info, body)) = current {
        blocks.push((info, body.join("\n")));
    }

    blocks
}

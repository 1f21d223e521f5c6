// src/llm/anthropic.rs
// Anthropic Messages API client backing the Translator trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use super::{
    parse_translation, system_prompt, user_prompt, TranslateError, TranslatedUnit,
    TranslationRequest, Translator,
};
use crate::config::RecodeConfig;
use crate::state::TokenUsage;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_ATTEMPTS: u32 = 3;

pub struct AnthropicTranslator {
    client: Client,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl AnthropicTranslator {
    pub fn new(config: &RecodeConfig) -> Result<Self, TranslateError> {
        if config.anthropic_api_key.is_empty() {
            return Err(TranslateError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        })
    }

    /// Clamp max_tokens to the model's known output cap. Defaults
    /// conservatively if unknown.
    fn clamp_max_tokens(model: &str, requested: u32) -> u32 {
        let m = model.to_ascii_lowercase();

        let cap = if m.contains("sonnet-4") {
            64_000
        } else if m.contains("opus-4") {
            32_000
        } else {
            8_192
        };

        requested.clamp(1, cap)
    }

    async fn create_message(&self, request: MessageRequest) -> Result<MessageResponse, TranslateError> {
        let mut attempt = 0;

        loop {
            let response = self
                .client
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&request)
                .send()
                .await?;

            match response.status().as_u16() {
                200 => return Ok(response.json::<MessageResponse>().await?),
                429 => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(TranslateError::RateLimited(MAX_ATTEMPTS));
                    }
                    let wait = Duration::from_secs(2u64.pow(attempt));
                    warn!("rate limited, retrying in {:?}", wait);
                    sleep(wait).await;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(TranslateError::Api { status, body });
                }
            }
        }
    }
}

#[async_trait]
impl Translator for AnthropicTranslator {
    async fn translate(&self, req: TranslationRequest) -> Result<TranslatedUnit, TranslateError> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: Self::clamp_max_tokens(&self.model, self.max_output_tokens),
            temperature: Some(self.temperature),
            system: Some(system_prompt(&req.source_lang, &req.target_lang)),
            messages: vec![Message {
                role: "user".to_string(),
                content: user_prompt(&req),
            }],
        };

        let response = self.create_message(request).await?;
        let text = response.text();
        let (content, new_mappings) = parse_translation(&text)?;

        Ok(TranslatedUnit {
            content,
            new_mappings,
            usage: Some(TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            }),
        })
    }
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[allow(dead_code)]
    stop_reason: Option<String>,
    usage: Usage,
}

impl MessageResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[allow(dead_code)]
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

// src/config/mod.rs
// Explicit configuration passed into the orchestrator at construction. Values
// come from the environment (.env supported); the CLI may override a few.

use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RecodeConfig {
    // ── Provider
    pub anthropic_api_key: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,

    // ── Catalog limits
    pub max_file_bytes: u64,
    pub max_files: usize,

    // ── Checkpointing
    pub state_dir_name: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Tolerate trailing comments and whitespace in .env values.
            let clean = val.split('#').next().unwrap_or("").trim();
            clean.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

impl RecodeConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: env_var_or("RECODE_MODEL", "claude-sonnet-4-20250514".to_string()),
            max_output_tokens: env_var_or("RECODE_MAX_OUTPUT_TOKENS", 8192),
            temperature: env_var_or("RECODE_TEMPERATURE", 0.1),
            request_timeout_secs: env_var_or("RECODE_REQUEST_TIMEOUT", 300),
            max_file_bytes: env_var_or("RECODE_MAX_FILE_BYTES", 100_000),
            max_files: env_var_or("RECODE_MAX_FILES", 25),
            state_dir_name: env_var_or("RECODE_STATE_DIR", ".recode".to_string()),
        }
    }
}

impl Default for RecodeConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_output_tokens: 8192,
            temperature: 0.1,
            request_timeout_secs: 300,
            max_file_bytes: 100_000,
            max_files: 25,
            state_dir_name: ".recode".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_strips_inline_comments() {
        unsafe { std::env::set_var("RECODE_TEST_COMMENTED", "42 # files") };
        assert_eq!(env_var_or::<usize>("RECODE_TEST_COMMENTED", 7), 42);
        unsafe { std::env::remove_var("RECODE_TEST_COMMENTED") };
    }

    #[test]
    fn env_var_or_falls_back_on_garbage() {
        unsafe { std::env::set_var("RECODE_TEST_GARBAGE", "not-a-number") };
        assert_eq!(env_var_or::<u64>("RECODE_TEST_GARBAGE", 99), 99);
        unsafe { std::env::remove_var("RECODE_TEST_GARBAGE") };
    }

    #[test]
    fn defaults_are_sane() {
        let config = RecodeConfig::default();
        assert_eq!(config.max_files, 25);
        assert_eq!(config.max_file_bytes, 100_000);
        assert!(config.model.starts_with("claude-"));
    }
}

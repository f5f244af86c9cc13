use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Directory holding one prompt file per evaluation category.
    pub prompts_dir: PathBuf,
    /// Capacity (and refill rate) of the process-wide token bucket,
    /// in output tokens per minute.
    pub tokens_per_minute: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            prompts_dir: std::env::var("PROMPTS_DIR")
                .unwrap_or_else(|_| "prompts".to_string())
                .into(),
            tokens_per_minute: std::env::var("TOKENS_PER_MINUTE")
                .unwrap_or_else(|_| "400000".to_string())
                .parse::<f64>()
                .context("TOKENS_PER_MINUTE must be a number")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

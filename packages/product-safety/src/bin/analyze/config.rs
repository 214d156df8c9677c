use anyhow::{Context, Result};
use dotenvy::dotenv;
use product_safety::ai::ApiKey;
use product_safety::{PipelineConfig, RetryPolicy};
use std::env;
use std::time::Duration;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: ApiKey,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub database_url: Option<String>,
    pub fetch_requests_per_second: u32,
    pub max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            openai_api_key: ApiKey::from_env("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            fetch_requests_per_second: env::var("FETCH_REQUESTS_PER_SECOND")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("FETCH_REQUESTS_PER_SECOND must be a valid number")?,
            max_retries: optional_number("ANALYSIS_MAX_RETRIES")?,
            retry_base_ms: optional_number("ANALYSIS_RETRY_BASE_MS")?,
        })
    }

    /// Pipeline settings with any retry overrides applied.
    pub fn pipeline(&self) -> PipelineConfig {
        let mut retry = RetryPolicy::default();
        if let Some(max_retries) = self.max_retries {
            retry = retry.with_max_retries(max_retries);
        }
        if let Some(base_ms) = self.retry_base_ms {
            retry = retry.with_base_delay(Duration::from_millis(base_ms));
        }
        PipelineConfig::default().with_retry(retry)
    }
}

fn optional_number<T: std::str::FromStr>(var: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a valid number", var)),
        Err(_) => Ok(None),
    }
}

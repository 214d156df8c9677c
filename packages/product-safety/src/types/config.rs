//! Configuration types for the analysis and review pipelines.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy for transient enrichment/extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    ///
    /// Default: 3 (four calls in total).
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds. Doubles each retry.
    ///
    /// Default: 1000.
    pub base_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    ///
    /// Default: 30000.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before retry number `attempt` (0-based): `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Thresholds and timeouts for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scrapes below this confidence go to the combined fallback.
    ///
    /// Default: 0.3.
    pub min_scrape_confidence: f32,

    /// Extractions below this confidence go to the combined fallback.
    ///
    /// Default: 0.3.
    pub min_extraction_confidence: f32,

    /// Review insights below this confidence are rejected.
    ///
    /// Default: 0.3.
    pub min_review_confidence: f32,

    /// Review text shorter than this counts as no reviews.
    ///
    /// Default: 100 characters.
    pub min_review_text_len: usize,

    pub fetch_timeout_ms: u64,
    pub extract_timeout_ms: u64,
    pub enrich_timeout_ms: u64,
    pub store_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_scrape_confidence: 0.3,
            min_extraction_confidence: 0.3,
            min_review_confidence: 0.3,
            min_review_text_len: 100,
            fetch_timeout_ms: 30_000,
            extract_timeout_ms: 60_000,
            enrich_timeout_ms: 120_000,
            store_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_scrape_confidence(mut self, min: f32) -> Self {
        self.min_scrape_confidence = min;
        self
    }

    pub fn with_min_extraction_confidence(mut self, min: f32) -> Self {
        self.min_extraction_confidence = min;
        self
    }

    pub fn with_min_review_confidence(mut self, min: f32) -> Self {
        self.min_review_confidence = min;
        self
    }

    /// Set all four call timeouts at once.
    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_millis() as u64;
        self.fetch_timeout_ms = ms;
        self.extract_timeout_ms = ms;
        self.enrich_timeout_ms = ms;
        self.store_timeout_ms = ms;
        self
    }

    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

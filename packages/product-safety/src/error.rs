//! Typed errors for the product safety pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Three families:
//!
//! - [`ServiceError`] - failures reported by an external collaborator
//!   (page fetcher, extractor, enricher)
//! - [`StoreError`] - knowledge store failures
//! - [`AnalysisError`] - what the pipeline surfaces to its caller

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::product_url::Fingerprint;

/// Pipeline stages, used to tag errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    CacheCheck,
    Scraping,
    Extracting,
    Matching,
    Enriching,
    Merging,
    Scoring,
    Persisting,
    ErrorFallback,
    Reviews,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CacheCheck => "cache_check",
            Stage::Scraping => "scraping",
            Stage::Extracting => "extracting",
            Stage::Matching => "matching",
            Stage::Enriching => "enriching",
            Stage::Merging => "merging",
            Stage::Scoring => "scoring",
            Stage::Persisting => "persisting",
            Stage::ErrorFallback => "error_fallback",
            Stage::Reviews => "reviews",
        };
        f.write_str(name)
    }
}

/// Errors reported by a fetcher, extractor or enricher.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service asked us to slow down
    #[error("rate limited{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// The service is temporarily overloaded
    #[error("service overloaded")]
    Overloaded,

    /// The call did not complete in time
    #[error("timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success status from the service
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    /// Service not configured or otherwise unusable
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. } | ServiceError::Overloaded)
    }

    /// Whether this is a rate-limit/overload signal.
    pub fn is_rate_limited(&self) -> bool {
        self.is_transient()
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Parse(e.to_string())
    }
}

/// Errors from a [`KnowledgeStore`](crate::traits::store::KnowledgeStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store is not configured or not reachable
    #[error("knowledge store unavailable")]
    Unavailable,

    /// Backend operation failed
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the analysis and review pipelines.
///
/// Recoverable conditions (low-confidence scrape, rate-limited enrichment,
/// failed persistence) are handled inside the pipeline; only the variants
/// that reach the caller are listed here with enough context to log and
/// retry.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Scraping failed and no fallback was possible
    #[error("scrape failed for {url}: {reason}")]
    ScrapeFailed {
        url: String,
        stage: Stage,
        reason: String,
    },

    /// Structured extraction was unusable and no fallback was possible
    #[error("extraction failed for {url}: {reason}")]
    ExtractionFailed { url: String, reason: String },

    /// Still rate limited after exhausting retries
    #[error("rate limited during {stage} for {url} after {attempts} attempts")]
    RateLimited {
        url: String,
        stage: Stage,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    /// Enrichment failed where no degrade path exists
    #[error("enrichment failed during {stage} for {url}: {source}")]
    EnrichmentFailed {
        url: String,
        stage: Stage,
        #[source]
        source: ServiceError,
    },

    /// Persistence failed (surfaced only by explicit store calls)
    #[error("failed to persist analysis for {url}: {source}")]
    PersistenceFailed {
        url: String,
        #[source]
        source: StoreError,
    },

    /// No cached analysis exists for the fingerprint
    #[error("no analysis found for fingerprint {fingerprint}")]
    NotFound { fingerprint: Fingerprint },

    /// The product page had no review content
    #[error("no reviews available for {url}")]
    NoReviewsAvailable { url: String },

    /// Review extraction returned too little confidence or failed outright
    #[error("review extraction failed for {url}: {reason}")]
    ReviewExtractionFailed { url: String, reason: String },

    /// The run was cancelled by the caller
    #[error("analysis cancelled during {stage} for {url}")]
    Cancelled { url: String, stage: Stage },
}

impl AnalysisError {
    /// The pipeline stage the error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::ScrapeFailed { stage, .. } => *stage,
            AnalysisError::ExtractionFailed { .. } => Stage::Extracting,
            AnalysisError::RateLimited { stage, .. } => *stage,
            AnalysisError::EnrichmentFailed { stage, .. } => *stage,
            AnalysisError::PersistenceFailed { .. } => Stage::Persisting,
            AnalysisError::NotFound { .. } => Stage::CacheCheck,
            AnalysisError::NoReviewsAvailable { .. } => Stage::Reviews,
            AnalysisError::ReviewExtractionFailed { .. } => Stage::Reviews,
            AnalysisError::Cancelled { stage, .. } => *stage,
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::RateLimited { .. } | AnalysisError::Cancelled { .. }
        )
    }
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, AnalysisError>;

/// Result type alias for collaborator calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::RateLimited { retry_after: None }.is_transient());
        assert!(ServiceError::Overloaded.is_transient());
        assert!(!ServiceError::Timeout {
            after: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!ServiceError::Parse("bad".into()).is_transient());
    }

    #[test]
    fn test_rate_limited_display_includes_retry_after() {
        let err = ServiceError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.to_string(), "rate limited (retry after 7s)");
        assert_eq!(
            ServiceError::RateLimited { retry_after: None }.to_string(),
            "rate limited"
        );
    }

    #[test]
    fn test_analysis_error_context() {
        let err = AnalysisError::RateLimited {
            url: "https://example.com/p".into(),
            stage: Stage::ErrorFallback,
            attempts: 4,
            source: ServiceError::Overloaded,
        };
        assert!(err.is_retryable());
        assert_eq!(err.stage(), Stage::ErrorFallback);
        assert!(err.to_string().contains("error_fallback"));
        assert!(err.to_string().contains("https://example.com/p"));

        let not_found = AnalysisError::NotFound {
            fingerprint: Fingerprint::of("https://example.com/p"),
        };
        assert!(!not_found.is_retryable());
    }
}

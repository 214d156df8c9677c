//! Review insights pipeline.
//!
//! Independent of scoring: recovers the product URL from a cached
//! analysis, scrapes the review sections and runs one extraction call.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{AnalysisError, PipelineResult, Stage, StoreResult};
use crate::pipeline::retry::{call_once, call_with_retry, store_call, CallFailure};
use crate::traits::{ai::Extractor, fetcher::PageFetcher, store::KnowledgeStore};
use crate::types::{analysis::Fingerprint, config::PipelineConfig, reviews::ReviewInsights};

/// Extracts consumer insights from a product's reviews and Q&A.
pub struct ReviewInsightsExtractor<S, F, X>
where
    S: KnowledgeStore,
    F: PageFetcher,
    X: Extractor,
{
    store: S,
    fetcher: F,
    extractor: X,
    config: PipelineConfig,
}

impl<S, F, X> ReviewInsightsExtractor<S, F, X>
where
    S: KnowledgeStore,
    F: PageFetcher,
    X: Extractor,
{
    pub fn new(store: S, fetcher: F, extractor: X) -> Self {
        Self::with_config(store, fetcher, extractor, PipelineConfig::default())
    }

    pub fn with_config(store: S, fetcher: F, extractor: X, config: PipelineConfig) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Review insights for a previously analyzed product.
    ///
    /// Fails with [`AnalysisError::NotFound`] when no analysis is cached
    /// for the fingerprint.
    pub async fn get_review_insights(
        &self,
        fingerprint: &Fingerprint,
        force_refresh: bool,
    ) -> PipelineResult<ReviewInsights> {
        self.get_review_insights_with_cancel(fingerprint, force_refresh, &CancellationToken::new())
            .await
    }

    pub async fn get_review_insights_with_cancel(
        &self,
        fingerprint: &Fingerprint,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> PipelineResult<ReviewInsights> {
        let span = info_span!("review_insights", fingerprint = %fingerprint.short());
        self.run(fingerprint, force_refresh, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        fingerprint: &Fingerprint,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> PipelineResult<ReviewInsights> {
        let not_found = || AnalysisError::NotFound {
            fingerprint: fingerprint.clone(),
        };

        if !self.store.is_available().await {
            warn!("Knowledge store unavailable, cannot recover product URL");
            return Err(not_found());
        }

        // No product URL yet; the fingerprint stands in for it
        let record = match self
            .store_op(fingerprint.as_str(), cancel, self.store.get_cached(fingerprint))
            .await?
        {
            Ok(Some(record)) => record,
            Ok(None) => return Err(not_found()),
            Err(e) => {
                warn!(error = %e, "Analysis lookup failed");
                return Err(not_found());
            }
        };
        let url = record.product_url;

        if !force_refresh {
            match self
                .store_op(&url, cancel, self.store.get_cached_reviews(fingerprint))
                .await?
            {
                Ok(Some(stored)) => {
                    info!(url = %url, "Returning cached review insights");
                    return Ok(stored.insights);
                }
                Ok(None) => debug!("No cached review insights"),
                Err(e) => warn!(error = %e, "Review cache lookup failed, treating as miss"),
            }
        }

        info!(url = %url, stage = %Stage::Reviews, "Fetching review sections");
        let content = match call_once(
            self.config.fetch_timeout(),
            cancel,
            self.fetcher.fetch(&url, true),
        )
        .await
        {
            Ok(content) => content,
            Err(CallFailure::Cancelled) => {
                return Err(AnalysisError::Cancelled {
                    url,
                    stage: Stage::Reviews,
                })
            }
            Err(CallFailure::Service { error, .. }) => {
                return Err(AnalysisError::ScrapeFailed {
                    url,
                    stage: Stage::Reviews,
                    reason: error.to_string(),
                })
            }
        };

        let review_len = content.review_section_text.trim().chars().count();
        if !content.has_reviews || review_len < self.config.min_review_text_len {
            info!(url = %url, review_chars = review_len, "No usable review content");
            return Err(AnalysisError::NoReviewsAvailable { url });
        }

        let outcome = call_with_retry(
            &self.config.retry,
            self.config.extract_timeout(),
            cancel,
            "extract_reviews",
            || self.extractor.extract_reviews(&content),
        )
        .await;

        let payload = match outcome {
            Ok(payload) => payload,
            Err(CallFailure::Cancelled) => {
                return Err(AnalysisError::Cancelled {
                    url,
                    stage: Stage::Reviews,
                })
            }
            Err(CallFailure::Service { error, attempts }) if error.is_rate_limited() => {
                return Err(AnalysisError::RateLimited {
                    url,
                    stage: Stage::Reviews,
                    attempts,
                    source: error,
                })
            }
            Err(CallFailure::Service { error, .. }) => {
                return Err(AnalysisError::ReviewExtractionFailed {
                    url,
                    reason: error.to_string(),
                })
            }
        };

        if payload.confidence.is_nan() || payload.confidence < self.config.min_review_confidence {
            return Err(AnalysisError::ReviewExtractionFailed {
                url,
                reason: format!(
                    "confidence {:.2} below {:.2}",
                    payload.confidence, self.config.min_review_confidence
                ),
            });
        }

        let insights = ReviewInsights::from_payload(fingerprint.clone(), &url, payload);
        info!(
            url = %url,
            reviews = insights.total_reviews_analyzed,
            complaints = insights.common_complaints.len(),
            health_concerns = insights.health_concerns.len(),
            "Review insights extracted"
        );

        if let Err(e) = self
            .store_op(&url, cancel, self.store.store_reviews(fingerprint, insights.clone()))
            .await?
        {
            warn!(error = %e, "Failed to cache review insights");
        }

        Ok(insights)
    }

    /// Bound a store call by the store timeout and the run's token.
    async fn store_op<T>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        op: impl Future<Output = StoreResult<T>>,
    ) -> PipelineResult<StoreResult<T>> {
        store_call(self.config.store_timeout(), cancel, op)
            .await
            .ok_or_else(|| AnalysisError::Cancelled {
                url: url.to_string(),
                stage: Stage::Reviews,
            })
    }
}

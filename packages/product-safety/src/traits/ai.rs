//! Extraction and enrichment traits for model-backed services.
//!
//! Both are non-deterministic in practice; the pipeline only relies on
//! their contracts:
//! - [`Extractor`]: scraped text to structured product or review data
//! - [`Enricher`]: structured product (or a bare URL) to a raw detection payload
//!
//! A rate-limit or overload signal must be reported as
//! [`ServiceError::RateLimited`](crate::error::ServiceError::RateLimited) or
//! [`ServiceError::Overloaded`](crate::error::ServiceError::Overloaded) so the
//! pipeline can back off and degrade.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ServiceResult;
use crate::pipeline::validate::RawDetectionPayload;
use crate::types::{
    product::{ExtractedProduct, ScrapedContent},
    reference::ReferenceTables,
    reviews::ReviewInsightsPayload,
};

/// Structured extraction over scraped page text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract product data from the product sections.
    async fn extract(&self, content: &ScrapedContent) -> ServiceResult<ExtractedProduct>;

    /// Extract consumer insights from the review and Q&A sections.
    async fn extract_reviews(&self, content: &ScrapedContent)
        -> ServiceResult<ReviewInsightsPayload>;
}

/// What the enricher reasons over.
#[derive(Debug, Clone, Copy)]
pub enum EnrichmentInput<'a> {
    /// Already-extracted product data; the enricher must not re-fetch.
    Product(&'a ExtractedProduct),

    /// Combined fetch+analyze: the enricher retrieves the page itself.
    Url(&'a str),
}

impl EnrichmentInput<'_> {
    pub fn is_combined(&self) -> bool {
        matches!(self, EnrichmentInput::Url(_))
    }
}

/// AI enrichment producing allergen, PFAS and other-concern detections.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        input: EnrichmentInput<'_>,
        allergen_profile: &[String],
        refs: &ReferenceTables,
    ) -> ServiceResult<RawDetectionPayload>;
}

#[async_trait]
impl<T: Extractor + ?Sized> Extractor for Arc<T> {
    async fn extract(&self, content: &ScrapedContent) -> ServiceResult<ExtractedProduct> {
        (**self).extract(content).await
    }

    async fn extract_reviews(
        &self,
        content: &ScrapedContent,
    ) -> ServiceResult<ReviewInsightsPayload> {
        (**self).extract_reviews(content).await
    }
}

#[async_trait]
impl<T: Enricher + ?Sized> Enricher for Arc<T> {
    async fn enrich(
        &self,
        input: EnrichmentInput<'_>,
        allergen_profile: &[String],
        refs: &ReferenceTables,
    ) -> ServiceResult<RawDetectionPayload> {
        (**self).enrich(input, allergen_profile, refs).await
    }
}

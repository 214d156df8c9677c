//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline
//! without making real AI or network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::validate::{RawAllergen, RawConcern, RawDetectionPayload, RawPfas};
use crate::stores::MemoryStore;
use crate::traits::{
    ai::{EnrichmentInput, Enricher, Extractor},
    fetcher::PageFetcher,
};
use crate::types::{
    detection::Severity,
    product::{ExtractedProduct, ScrapedContent},
    product_url::retailer_for,
    reference::{AllergenRef, PfasRef, ReferenceTables},
    reviews::{HealthConcern, ReviewInsightsPayload, Sentiment},
};

/// Product text returned by [`MockFetcher`] unless overridden.
pub const MOCK_PRODUCT_TEXT: &str = "=== title ===\nMock Product\n\n=== product_description ===\nA product used in tests.\n";

/// Failure a mock reports instead of answering.
#[derive(Debug, Clone)]
pub enum MockFailure {
    RateLimited,
    Overloaded,
    Error(String),
}

impl MockFailure {
    fn to_error(&self) -> ServiceError {
        match self {
            MockFailure::RateLimited => ServiceError::RateLimited { retry_after: None },
            MockFailure::Overloaded => ServiceError::Overloaded,
            MockFailure::Error(msg) => ServiceError::Unavailable(msg.clone()),
        }
    }
}

/// A failure plus how many more calls it applies to (`None` = every call).
#[derive(Debug, Clone)]
struct FailurePlan {
    failure: MockFailure,
    remaining: Option<usize>,
}

fn take_failure(slot: &RwLock<Option<FailurePlan>>) -> Option<ServiceError> {
    let mut slot = slot.write().unwrap();
    let plan = slot.as_mut()?;
    match plan.remaining {
        None => Some(plan.failure.to_error()),
        Some(0) => None,
        Some(n) => {
            plan.remaining = Some(n - 1);
            Some(plan.failure.to_error())
        }
    }
}

// ============================================================================
// MockFetcher
// ============================================================================

/// A mock page fetcher.
///
/// Returns [`MOCK_PRODUCT_TEXT`] at confidence 0.9 for any URL unless a
/// page is registered or the defaults are changed.
#[derive(Clone)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, ScrapedContent>>>,
    product_text: String,
    review_text: String,
    confidence: f32,
    failed_scrape: Option<String>,
    failure: Option<MockFailure>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockFetcherCall>>>,
}

/// Record of a fetch made to the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct MockFetcherCall {
    pub url: String,
    pub include_reviews: bool,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(RwLock::new(HashMap::new())),
            product_text: MOCK_PRODUCT_TEXT.to_string(),
            review_text: String::new(),
            confidence: 0.9,
            failed_scrape: None,
            failure: None,
            delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a fixed response for one URL.
    pub fn with_page(self, content: ScrapedContent) -> Self {
        self.pages
            .write()
            .unwrap()
            .insert(content.url.clone(), content);
        self
    }

    pub fn with_product_text(mut self, text: impl Into<String>) -> Self {
        self.product_text = text.into();
        self
    }

    /// Review text returned when reviews are requested.
    pub fn with_review_text(mut self, text: impl Into<String>) -> Self {
        self.review_text = text.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Report every fetch as a failed scrape (confidence 0, error message set).
    pub fn with_failed_scrape(mut self, reason: impl Into<String>) -> Self {
        self.failed_scrape = Some(reason.into());
        self
    }

    /// Return an `Err` from every fetch.
    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockFetcherCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, include_reviews: bool) -> ServiceResult<ScrapedContent> {
        self.calls.write().unwrap().push(MockFetcherCall {
            url: url.to_string(),
            include_reviews,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }

        if let Some(page) = self.pages.read().unwrap().get(url) {
            return Ok(page.clone());
        }

        if let Some(reason) = &self.failed_scrape {
            return Ok(ScrapedContent::failed(url, retailer_for(url), reason.clone()));
        }

        let mut content = ScrapedContent::new(url, retailer_for(url))
            .with_product_text(self.product_text.clone())
            .with_confidence(self.confidence)
            .with_method("mock");
        if include_reviews {
            content = content.with_review_text(self.review_text.clone());
        }
        Ok(content)
    }
}

// ============================================================================
// MockAnalyst
// ============================================================================

/// A mock extractor and enricher.
///
/// Returns deterministic, configurable responses and records every call.
/// Clones share configuration and call history.
#[derive(Clone, Default)]
pub struct MockAnalyst {
    product: Arc<RwLock<Option<ExtractedProduct>>>,
    reviews: Arc<RwLock<Option<ReviewInsightsPayload>>>,
    enrichment: Arc<RwLock<Option<RawDetectionPayload>>>,
    combined: Arc<RwLock<Option<RawDetectionPayload>>>,

    extract_failure: Arc<RwLock<Option<FailurePlan>>>,
    reviews_failure: Arc<RwLock<Option<FailurePlan>>>,
    enrich_failure: Arc<RwLock<Option<FailurePlan>>>,

    delay: Arc<RwLock<Option<Duration>>>,
    calls: Arc<RwLock<Vec<MockAnalystCall>>>,
}

/// Record of a call made to the mock analyst.
#[derive(Debug, Clone, PartialEq)]
pub enum MockAnalystCall {
    Extract {
        url: String,
    },
    ExtractReviews {
        url: String,
    },
    Enrich {
        /// Product name, or the url for combined fetch+analyze
        target: String,
        combined: bool,
        allergen_profile: Vec<String>,
    },
}

impl MockAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    /// Product returned by `extract` (default: "Mock Product", confidence 0.9).
    pub fn with_product(self, product: ExtractedProduct) -> Self {
        *self.product.write().unwrap() = Some(product);
        self
    }

    /// Payload returned by `extract_reviews`.
    pub fn with_reviews(self, payload: ReviewInsightsPayload) -> Self {
        *self.reviews.write().unwrap() = Some(payload);
        self
    }

    /// Payload returned by `enrich` over extracted data (default: empty, confidence 0.9).
    pub fn with_enrichment(self, payload: RawDetectionPayload) -> Self {
        *self.enrichment.write().unwrap() = Some(payload);
        self
    }

    /// Payload returned by combined fetch+analyze (default: same as `with_enrichment`).
    pub fn with_combined(self, payload: RawDetectionPayload) -> Self {
        *self.combined.write().unwrap() = Some(payload);
        self
    }

    /// Fail every `extract` call.
    pub fn failing_extract(self, failure: MockFailure) -> Self {
        Self::plan(&self.extract_failure, failure, None);
        self
    }

    /// Fail every `extract_reviews` call.
    pub fn failing_reviews(self, failure: MockFailure) -> Self {
        Self::plan(&self.reviews_failure, failure, None);
        self
    }

    /// Fail every `enrich` call.
    pub fn failing_enrich(self, failure: MockFailure) -> Self {
        Self::plan(&self.enrich_failure, failure, None);
        self
    }

    /// Fail the next `times` `enrich` calls, then answer normally.
    pub fn failing_enrich_times(self, failure: MockFailure, times: usize) -> Self {
        Self::plan(&self.enrich_failure, failure, Some(times));
        self
    }

    /// Rate-limit every `enrich` call.
    pub fn rate_limited(self) -> Self {
        self.failing_enrich(MockFailure::RateLimited)
    }

    /// Sleep before answering any call.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockAnalystCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn enrich_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockAnalystCall::Enrich { .. }))
            .count()
    }

    pub fn extract_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockAnalystCall::Extract { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn plan(slot: &RwLock<Option<FailurePlan>>, failure: MockFailure, remaining: Option<usize>) {
        *slot.write().unwrap() = Some(FailurePlan { failure, remaining });
    }

    fn record(&self, call: MockAnalystCall) {
        self.calls.write().unwrap().push(call);
    }

    async fn pause(&self) {
        let delay = *self.delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn default_enrichment() -> RawDetectionPayload {
        RawDetectionPayload {
            confidence: Some(0.9),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Extractor for MockAnalyst {
    async fn extract(&self, content: &ScrapedContent) -> ServiceResult<ExtractedProduct> {
        self.record(MockAnalystCall::Extract {
            url: content.url.clone(),
        });
        self.pause().await;

        if let Some(err) = take_failure(&self.extract_failure) {
            return Err(err);
        }

        let product = self.product.read().unwrap().clone();
        Ok(product.unwrap_or_else(|| ExtractedProduct::new("Mock Product").with_confidence(0.9)))
    }

    async fn extract_reviews(
        &self,
        content: &ScrapedContent,
    ) -> ServiceResult<ReviewInsightsPayload> {
        self.record(MockAnalystCall::ExtractReviews {
            url: content.url.clone(),
        });
        self.pause().await;

        if let Some(err) = take_failure(&self.reviews_failure) {
            return Err(err);
        }

        let payload = self.reviews.read().unwrap().clone();
        Ok(payload.unwrap_or_else(sample_reviews_payload))
    }
}

#[async_trait]
impl Enricher for MockAnalyst {
    async fn enrich(
        &self,
        input: EnrichmentInput<'_>,
        allergen_profile: &[String],
        _refs: &ReferenceTables,
    ) -> ServiceResult<RawDetectionPayload> {
        let target = match input {
            EnrichmentInput::Product(product) => product.product_name.clone(),
            EnrichmentInput::Url(url) => url.to_string(),
        };
        self.record(MockAnalystCall::Enrich {
            target,
            combined: input.is_combined(),
            allergen_profile: allergen_profile.to_vec(),
        });
        self.pause().await;

        if let Some(err) = take_failure(&self.enrich_failure) {
            return Err(err);
        }

        let enrichment = self.enrichment.read().unwrap().clone();
        let payload = if input.is_combined() {
            self.combined.read().unwrap().clone().or(enrichment)
        } else {
            enrichment
        };
        Ok(payload.unwrap_or_else(Self::default_enrichment))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A small allergen reference table.
pub fn sample_allergen_refs() -> Vec<AllergenRef> {
    vec![
        AllergenRef::new("fragrance")
            .with_synonyms(["parfum", "perfume"])
            .with_severity(Severity::Moderate),
        AllergenRef::new("peanut")
            .with_synonyms(["arachis oil", "groundnut"])
            .with_severity(Severity::Severe),
        AllergenRef::new("latex")
            .with_synonyms(["natural rubber"])
            .with_severity(Severity::High),
    ]
}

/// A small PFAS reference table.
pub fn sample_pfas_refs() -> Vec<PfasRef> {
    vec![
        PfasRef::new("PTFE")
            .with_cas_number("9002-84-0")
            .with_synonyms(["polytetrafluoroethylene", "teflon"])
            .with_body_effects("Linked to thyroid disease"),
        PfasRef::new("PFOA")
            .with_cas_number("335-67-1")
            .with_synonyms(["perfluorooctanoic acid", "c8"])
            .with_body_effects("Linked to kidney and testicular cancer"),
    ]
}

pub fn sample_reference_tables() -> ReferenceTables {
    ReferenceTables::new(sample_allergen_refs(), sample_pfas_refs())
}

/// A memory store seeded with the sample reference tables.
pub fn seeded_store() -> MemoryStore {
    MemoryStore::new()
        .with_allergen_refs(sample_allergen_refs())
        .with_pfas_refs(sample_pfas_refs())
}

/// An enrichment payload reporting one allergen, one PFAS and one other concern.
pub fn sample_enrichment() -> RawDetectionPayload {
    RawDetectionPayload {
        product_name: Some("Acme Nonstick Pan".into()),
        brand: Some("Acme".into()),
        retailer: Some("Amazon.com".into()),
        category: Some("cookware".into()),
        ingredients: vec!["PTFE coating".into(), "aluminum".into()],
        allergens_detected: vec![RawAllergen {
            name: Some("nickel".into()),
            severity: Some("moderate".into()),
            source: Some("handle rivets".into()),
            confidence: Some(0.6),
        }],
        pfas_detected: vec![RawPfas {
            name: Some("PTFE".into()),
            cas_number: Some("9002-84-0".into()),
            body_effects: Some("Linked to thyroid disease".into()),
            source: Some("coating".into()),
            confidence: Some(0.95),
        }],
        other_concerns: vec![RawConcern {
            name: Some("aluminum".into()),
            category: Some("heavy metal".into()),
            severity: Some("low".into()),
            description: Some("May leach into acidic food".into()),
            confidence: Some(0.5),
        }],
        confidence: Some(0.85),
        summary: Some("Nonstick coating contains PTFE.".into()),
    }
}

/// A review payload with one health concern at confidence 0.8.
pub fn sample_reviews_payload() -> ReviewInsightsPayload {
    ReviewInsightsPayload {
        overall_sentiment: Sentiment::Mixed,
        total_reviews_analyzed: 12,
        health_concerns: vec![HealthConcern {
            concern: "skin rash".into(),
            frequency: "occasional".into(),
            severity: Severity::Moderate,
            examples: vec!["Gave me a rash on my hands".into()],
        }],
        verified_purchase_ratio: 0.75,
        confidence: 0.8,
        ..Default::default()
    }
}

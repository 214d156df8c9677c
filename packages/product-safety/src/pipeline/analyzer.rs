//! The Analyzer - main entry point for product analysis.
//!
//! Drives one request through a linear sequence of stages:
//!
//! ```text
//! CacheCheck -> Scraping -> Extracting -> Matching -> Enriching -> Merging -> Scoring -> Persisting
//!                   \            \                        (degrades to database-only)
//!                    +------------+--> ErrorFallback (combined fetch+enrich) -> Scoring -> Persisting
//! ```
//!
//! Recoverable failures are handled here: a weak scrape or extraction
//! switches to the combined fallback, a failing enrichment degrades to
//! database-only matches, and a failing store is skipped. Only the
//! fallback path and cancellation can fail a request.

use chrono::Utc;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{AnalysisError, PipelineResult, ServiceError, Stage, StoreResult};
use crate::pipeline::{
    matcher::match_ingredients,
    merge::merge,
    retry::{call_once, call_with_retry, store_call, CallFailure},
    score,
    validate::{audit_unreferenced, validate_payload},
};
use crate::traits::{
    ai::{EnrichmentInput, Enricher, Extractor},
    fetcher::PageFetcher,
    store::KnowledgeStore,
};
use crate::types::{
    analysis::{
        AnalysisMode, AnalysisRequest, AnalysisResponse, AnalysisResult, Fingerprint, RiskLevel,
        StoredAnalysis,
    },
    config::PipelineConfig,
    detection::DetectionSet,
    product::{ExtractedProduct, ProductLabel, ScrapedContent},
    product_url::retailer_for,
    reference::ReferenceTables,
};

/// Overall confidence assumed when the enricher reports none.
const DEFAULT_ENRICHMENT_CONFIDENCE: f32 = 1.0;

/// Everything needed to score and persist a fresh analysis.
struct Draft {
    product_name: String,
    brand: String,
    retailer: String,
    category: String,
    ingredients: Vec<String>,
    detections: DetectionSet,
    confidence: f32,
    mode: AnalysisMode,
    notes: Vec<String>,
    /// Enricher's own summary, persisted with the record
    summary: Option<String>,
}

/// Product analysis pipeline over a store, a page fetcher and an analyst.
///
/// # Example
///
/// ```rust,ignore
/// let analyzer = Analyzer::new(store, fetcher, analyst);
///
/// let request = AnalysisRequest::new("https://www.amazon.com/dp/B000123")
///     .with_allergen_profile(["peanut"]);
/// let response = analyzer.analyze(&request).await?;
/// println!("{} ({})", response.harm_score, response.risk_level);
/// ```
pub struct Analyzer<S, F, A>
where
    S: KnowledgeStore,
    F: PageFetcher,
    A: Extractor + Enricher,
{
    store: S,
    fetcher: F,
    analyst: A,
    config: PipelineConfig,
}

impl<S, F, A> Analyzer<S, F, A>
where
    S: KnowledgeStore,
    F: PageFetcher,
    A: Extractor + Enricher,
{
    pub fn new(store: S, fetcher: F, analyst: A) -> Self {
        Self::with_config(store, fetcher, analyst, PipelineConfig::default())
    }

    pub fn with_config(store: S, fetcher: F, analyst: A, config: PipelineConfig) -> Self {
        Self {
            store,
            fetcher,
            analyst,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Analyze a product URL.
    pub async fn analyze(&self, request: &AnalysisRequest) -> PipelineResult<AnalysisResponse> {
        self.analyze_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Analyze a product URL, aborting outstanding calls when `cancel` fires.
    pub async fn analyze_with_cancel(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<AnalysisResponse> {
        let fingerprint = Fingerprint::of(&request.url);
        let span = info_span!(
            "analyze",
            url = %request.url,
            fingerprint = %fingerprint.short()
        );
        self.run(request, &fingerprint, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        fingerprint: &Fingerprint,
        cancel: &CancellationToken,
    ) -> PipelineResult<AnalysisResponse> {
        let url = request.url.trim();

        // CacheCheck
        let store_available = self.store.is_available().await;
        if store_available {
            if let Err(e) = self
                .store_op(url, Stage::CacheCheck, cancel, self.store.log_search(url))
                .await?
            {
                debug!(error = %e, "Search logging failed");
            }

            if request.force_refresh {
                info!(stage = %Stage::CacheCheck, "Forced refresh, skipping cache");
            } else {
                match self
                    .store_op(url, Stage::CacheCheck, cancel, self.store.get_cached(fingerprint))
                    .await?
                {
                    Ok(Some(record)) => {
                        info!(stage = %Stage::CacheCheck, "Cache hit");
                        return Ok(cached_response(record));
                    }
                    Ok(None) => debug!(stage = %Stage::CacheCheck, "Cache miss"),
                    Err(e) => warn!(
                        stage = %Stage::CacheCheck,
                        error = %e,
                        "Cache lookup failed, treating as miss"
                    ),
                }
            }
        } else {
            info!("Knowledge store unavailable, skipping cache and persistence");
        }

        let refs = self.load_refs(url, store_available, cancel).await?;

        // Scraping + Extracting
        let (content, product) = match self.scrape_and_extract(url, cancel).await? {
            Ok(pair) => pair,
            Err(reason) => {
                warn!(
                    stage = %reason.stage(),
                    error = %reason,
                    "Structured path unusable, switching to combined fallback"
                );
                let draft = self.error_fallback(url, request, &refs, &reason, cancel).await?;
                return self
                    .finish(url, fingerprint, draft, store_available, cancel)
                    .await;
            }
        };

        // Matching
        let db_matches =
            match_ingredients(&product.ingredients, &product.materials, &refs.allergens, &refs.pfas);
        let db_set = DetectionSet {
            allergens: db_matches.allergens,
            pfas: db_matches.pfas,
            other_concerns: Vec::new(),
        };
        info!(
            stage = %Stage::Matching,
            allergens = db_set.allergens.len(),
            pfas = db_set.pfas.len(),
            "Reference matching complete"
        );

        // Enriching + Merging
        let draft = self
            .enrich_and_merge(url, request, &refs, &content, product, db_set, cancel)
            .await?;

        self.finish(url, fingerprint, draft, store_available, cancel)
            .await
    }

    /// The inner error says why the structured path is unusable; the outer
    /// one is cancellation.
    async fn scrape_and_extract(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<Result<(ScrapedContent, ExtractedProduct), AnalysisError>> {
        info!(stage = %Stage::Scraping, "Fetching product page");
        let content = match call_once(
            self.config.fetch_timeout(),
            cancel,
            self.fetcher.fetch(url, false),
        )
        .await
        {
            Ok(content) => content,
            Err(CallFailure::Cancelled) => return Err(cancelled(url, Stage::Scraping)),
            Err(CallFailure::Service { error, .. }) => {
                return Ok(Err(AnalysisError::ScrapeFailed {
                    url: url.to_string(),
                    stage: Stage::Scraping,
                    reason: error.to_string(),
                }));
            }
        };

        debug!(
            bytes = content.product_section_text.len(),
            confidence = content.confidence,
            method = %content.method,
            "Scrape finished"
        );

        if content.is_failed() || content.confidence < self.config.min_scrape_confidence {
            let reason = match &content.error_message {
                Some(message) => message.clone(),
                None => format!(
                    "confidence {:.2} below {:.2}",
                    content.confidence, self.config.min_scrape_confidence
                ),
            };
            return Ok(Err(AnalysisError::ScrapeFailed {
                url: url.to_string(),
                stage: Stage::Scraping,
                reason,
            }));
        }

        info!(stage = %Stage::Extracting, confidence = content.confidence, "Extracting product data");
        let product = match call_once(
            self.config.extract_timeout(),
            cancel,
            self.analyst.extract(&content),
        )
        .await
        {
            Ok(product) => product,
            Err(CallFailure::Cancelled) => return Err(cancelled(url, Stage::Extracting)),
            Err(CallFailure::Service { error, .. }) => {
                warn!(stage = %Stage::Extracting, error = %error, "Extractor call failed");
                return Ok(Err(AnalysisError::ExtractionFailed {
                    url: url.to_string(),
                    reason: error.to_string(),
                }));
            }
        };

        if product.confidence.is_nan() || product.confidence < self.config.min_extraction_confidence
        {
            return Ok(Err(AnalysisError::ExtractionFailed {
                url: url.to_string(),
                reason: format!(
                    "confidence {:.2} below {:.2}",
                    product.confidence, self.config.min_extraction_confidence
                ),
            }));
        }

        debug!(
            product = %product.product_name,
            ingredients = product.ingredients.len(),
            materials = product.materials.len(),
            "Extraction finished"
        );

        Ok(Ok((content, product)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn enrich_and_merge(
        &self,
        url: &str,
        request: &AnalysisRequest,
        refs: &ReferenceTables,
        content: &ScrapedContent,
        product: ExtractedProduct,
        db_set: DetectionSet,
        cancel: &CancellationToken,
    ) -> PipelineResult<Draft> {
        info!(stage = %Stage::Enriching, "Enriching extracted product");
        let outcome = call_with_retry(
            &self.config.retry,
            self.config.enrich_timeout(),
            cancel,
            "enrich",
            || {
                self.analyst.enrich(
                    EnrichmentInput::Product(&product),
                    &request.allergen_profile,
                    refs,
                )
            },
        )
        .await;

        let ingredients = product.components();
        let mut draft = Draft {
            product_name: product.product_name.clone(),
            brand: product.brand.clone(),
            retailer: content.retailer.clone(),
            category: product.category.clone(),
            ingredients,
            detections: DetectionSet::default(),
            confidence: product.confidence,
            mode: AnalysisMode::DatabaseOnly,
            notes: Vec::new(),
            summary: None,
        };

        match outcome {
            Ok(raw) => {
                let enriched = validate_payload(raw);
                audit_unreferenced(&enriched.detections, refs, url, &draft.product_name);

                info!(
                    stage = %Stage::Merging,
                    db = db_set.len(),
                    ai = enriched.detections.len(),
                    "Merging detections"
                );
                draft.detections = merge(&db_set, &enriched.detections);
                draft.mode = AnalysisMode::Full;
                draft.summary = enriched.summary;
                if let Some(confidence) = enriched.confidence {
                    draft.confidence = confidence;
                }
                if draft.product_name.is_empty() {
                    draft.product_name = enriched.product_name.unwrap_or_default();
                }
                if draft.brand.is_empty() {
                    draft.brand = enriched.brand.unwrap_or_default();
                }
                if draft.category.is_empty() {
                    draft.category = enriched.category.unwrap_or_default();
                }
            }
            Err(CallFailure::Cancelled) => return Err(cancelled(url, Stage::Enriching)),
            Err(CallFailure::Service { error, attempts }) => {
                let note = if error.is_rate_limited() {
                    format!(
                        "AI enrichment skipped: rate limited after {} attempts; showing database matches only",
                        attempts
                    )
                } else {
                    format!("AI enrichment failed ({}); showing database matches only", error)
                };
                let degraded = enrichment_error(url, Stage::Enriching, attempts, error);
                warn!(stage = %Stage::Enriching, error = %degraded, "Degrading to database-only");

                draft.detections = db_set;
                draft.notes.push(note);
            }
        }

        Ok(draft)
    }

    async fn error_fallback(
        &self,
        url: &str,
        request: &AnalysisRequest,
        refs: &ReferenceTables,
        reason: &AnalysisError,
        cancel: &CancellationToken,
    ) -> PipelineResult<Draft> {
        info!(stage = %Stage::ErrorFallback, "Running combined fetch+enrich");
        let outcome = call_with_retry(
            &self.config.retry,
            self.config.enrich_timeout(),
            cancel,
            "enrich_url",
            || {
                self.analyst
                    .enrich(EnrichmentInput::Url(url), &request.allergen_profile, refs)
            },
        )
        .await;

        let raw = match outcome {
            Ok(raw) => raw,
            Err(CallFailure::Cancelled) => return Err(cancelled(url, Stage::ErrorFallback)),
            Err(CallFailure::Service { error, attempts }) => {
                let err = enrichment_error(url, Stage::ErrorFallback, attempts, error);
                error!(stage = %Stage::ErrorFallback, error = %err, "Combined fallback failed");
                return Err(err);
            }
        };

        let enriched = validate_payload(raw);
        let product_name = enriched.product_name.clone().unwrap_or_default();
        audit_unreferenced(&enriched.detections, refs, url, &product_name);

        // The enricher's own ingredient list is the only one available here.
        let db_matches =
            match_ingredients(&enriched.ingredients, &[], &refs.allergens, &refs.pfas);
        let db_set = DetectionSet {
            allergens: db_matches.allergens,
            pfas: db_matches.pfas,
            other_concerns: Vec::new(),
        };

        Ok(Draft {
            product_name,
            brand: enriched.brand.unwrap_or_default(),
            retailer: enriched.retailer.unwrap_or_else(|| retailer_for(url)),
            category: enriched.category.unwrap_or_default(),
            detections: merge(&db_set, &enriched.detections),
            ingredients: enriched.ingredients,
            confidence: enriched
                .confidence
                .unwrap_or(DEFAULT_ENRICHMENT_CONFIDENCE),
            mode: AnalysisMode::Fallback,
            notes: vec![format!(
                "Structured scraping unavailable ({}); analyzed with combined fetch and analysis",
                reason
            )],
            summary: enriched.summary,
        })
    }

    /// Scoring + Persisting.
    async fn finish(
        &self,
        url: &str,
        fingerprint: &Fingerprint,
        draft: Draft,
        store_available: bool,
        cancel: &CancellationToken,
    ) -> PipelineResult<AnalysisResponse> {
        let label = ProductLabel::new(&draft.product_name, &draft.category);
        let breakdown = score::breakdown(&draft.detections, &label, draft.confidence);
        info!(
            stage = %Stage::Scoring,
            harm_score = breakdown.harm_score,
            base_points = breakdown.base_points,
            multiplier = breakdown.multiplier,
            penalty = breakdown.confidence_penalty,
            floor = breakdown.floor_applied,
            mode = ?draft.mode,
            "Scored"
        );

        let analysis = AnalysisResult {
            product_url: url.to_string(),
            product_name: draft.product_name,
            brand: draft.brand,
            retailer: draft.retailer,
            ingredients: draft.ingredients,
            overall_score: 100 - breakdown.harm_score,
            allergens_detected: draft.detections.allergens,
            pfas_detected: draft.detections.pfas,
            other_concerns: draft.detections.other_concerns,
            confidence: draft.confidence,
            analyzed_at: Utc::now(),
        };

        let mut persisted = false;
        if store_available {
            let record = StoredAnalysis::from_result(fingerprint, &analysis, draft.mode, &draft.notes)
                .with_summary(draft.summary.as_deref())
                .with_product_category(&draft.category);
            match self
                .store_op(
                    url,
                    Stage::Persisting,
                    cancel,
                    self.store.store(fingerprint, url, record),
                )
                .await?
            {
                Ok(()) => {
                    persisted = true;
                    debug!(stage = %Stage::Persisting, "Analysis persisted");
                }
                Err(source) => {
                    let err = AnalysisError::PersistenceFailed {
                        url: url.to_string(),
                        source,
                    };
                    warn!(stage = %Stage::Persisting, error = %err, "Returning unpersisted result");
                }
            }
        }

        Ok(AnalysisResponse {
            harm_score: breakdown.harm_score,
            risk_level: breakdown.risk_level(),
            analysis,
            cached: false,
            cache_age_seconds: None,
            mode: draft.mode,
            notes: draft.notes,
            persisted,
        })
    }

    async fn load_refs(
        &self,
        url: &str,
        store_available: bool,
        cancel: &CancellationToken,
    ) -> PipelineResult<ReferenceTables> {
        if !store_available {
            return Ok(ReferenceTables::default());
        }
        match self
            .store_op(url, Stage::Matching, cancel, self.store.reference_tables())
            .await?
        {
            Ok(tables) => {
                debug!(
                    allergens = tables.allergens.len(),
                    pfas = tables.pfas.len(),
                    "Reference tables loaded"
                );
                Ok(tables)
            }
            Err(e) => {
                warn!(error = %e, "Reference tables unavailable, matching against empty tables");
                Ok(ReferenceTables::default())
            }
        }
    }

    /// Bound a store call by the store timeout and the run's token.
    async fn store_op<T>(
        &self,
        url: &str,
        stage: Stage,
        cancel: &CancellationToken,
        op: impl Future<Output = StoreResult<T>>,
    ) -> PipelineResult<StoreResult<T>> {
        store_call(self.config.store_timeout(), cancel, op)
            .await
            .ok_or_else(|| cancelled(url, stage))
    }
}

fn cached_response(record: StoredAnalysis) -> AnalysisResponse {
    let harm_score = record.harm_score.min(100);
    let cache_age_seconds = Some(record.age_seconds(Utc::now()));
    AnalysisResponse {
        analysis: record.to_result(),
        harm_score,
        risk_level: RiskLevel::from_harm_score(harm_score),
        cached: true,
        cache_age_seconds,
        mode: AnalysisMode::Cached,
        notes: Vec::new(),
        persisted: true,
    }
}

fn cancelled(url: &str, stage: Stage) -> AnalysisError {
    AnalysisError::Cancelled {
        url: url.to_string(),
        stage,
    }
}

fn enrichment_error(url: &str, stage: Stage, attempts: u32, error: ServiceError) -> AnalysisError {
    if error.is_rate_limited() {
        AnalysisError::RateLimited {
            url: url.to_string(),
            stage,
            attempts,
            source: error,
        }
    } else {
        AnalysisError::EnrichmentFailed {
            url: url.to_string(),
            stage,
            source: error,
        }
    }
}

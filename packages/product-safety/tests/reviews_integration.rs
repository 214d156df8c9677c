//! Integration tests for review insights extraction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use product_safety::testing::{
    sample_reviews_payload, MockAnalyst, MockAnalystCall, MockFailure, MockFetcher,
};
use product_safety::{
    AllergenRef, AnalysisError, AnalysisRequest, Analyzer, Fingerprint, KnowledgeStore,
    MemoryStore, PfasRef, PipelineConfig, RetryPolicy, ReviewInsights, ReviewInsightsExtractor,
    ReviewInsightsPayload, Sentiment, Stage, StoreResult, StoredAnalysis, StoredReviews,
};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const URL: &str = "https://www.amazon.com/dp/B000REVIEW";

const REVIEW_TEXT: &str = "=== reviews ===\n\
    5.0 out of 5 stars Works great. Verified Purchase. Cooks evenly and cleans up easily.\n\
    2.0 out of 5 stars Coating peeled. Verified Purchase. Started flaking after two months of use.\n";

fn fast_config() -> PipelineConfig {
    PipelineConfig::default().with_retry(
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5)),
    )
}

/// A store holding one analysis of [`URL`].
async fn analyzed_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let analyzer = Analyzer::with_config(
        store.clone(),
        MockFetcher::new(),
        MockAnalyst::new(),
        fast_config(),
    );
    assert_ok!(analyzer.analyze(&AnalysisRequest::new(URL)).await);
    store
}

/// Wraps a [`MemoryStore`], hanging on the calls it is told to.
#[derive(Clone, Default)]
struct SlowStore {
    inner: Arc<MemoryStore>,
    hang_lookup: bool,
    hang_review_write: bool,
}

const HANG: Duration = Duration::from_secs(30);

#[async_trait]
impl KnowledgeStore for SlowStore {
    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }

    async fn get_cached(&self, fingerprint: &Fingerprint) -> StoreResult<Option<StoredAnalysis>> {
        if self.hang_lookup {
            tokio::time::sleep(HANG).await;
        }
        self.inner.get_cached(fingerprint).await
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        url: &str,
        record: StoredAnalysis,
    ) -> StoreResult<()> {
        self.inner.store(fingerprint, url, record).await
    }

    async fn get_allergen_refs(&self) -> StoreResult<Vec<AllergenRef>> {
        self.inner.get_allergen_refs().await
    }

    async fn get_pfas_refs(&self) -> StoreResult<Vec<PfasRef>> {
        self.inner.get_pfas_refs().await
    }

    async fn get_cached_reviews(
        &self,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<StoredReviews>> {
        self.inner.get_cached_reviews(fingerprint).await
    }

    async fn store_reviews(
        &self,
        fingerprint: &Fingerprint,
        insights: ReviewInsights,
    ) -> StoreResult<()> {
        if self.hang_review_write {
            tokio::time::sleep(HANG).await;
        }
        self.inner.store_reviews(fingerprint, insights).await
    }
}

fn extractor(
    store: Arc<MemoryStore>,
    fetcher: MockFetcher,
    analyst: MockAnalyst,
) -> ReviewInsightsExtractor<Arc<MemoryStore>, MockFetcher, MockAnalyst> {
    ReviewInsightsExtractor::with_config(store, fetcher, analyst, fast_config())
}

#[tokio::test]
async fn test_unknown_fingerprint_is_not_found() {
    let fetcher = MockFetcher::new().with_review_text(REVIEW_TEXT);
    let extractor = extractor(Arc::new(MemoryStore::new()), fetcher.clone(), MockAnalyst::new());

    let err = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::NotFound { .. }));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_extracts_and_caches_insights() {
    let store = analyzed_store().await;
    let fetcher = MockFetcher::new().with_review_text(REVIEW_TEXT);
    let analyst = MockAnalyst::new().with_reviews(sample_reviews_payload());
    let extractor = extractor(store.clone(), fetcher.clone(), analyst.clone());
    let fingerprint = Fingerprint::of(URL);

    let insights = extractor
        .get_review_insights(&fingerprint, false)
        .await
        .unwrap();

    assert_eq!(insights.product_url, URL);
    assert_eq!(insights.fingerprint, fingerprint);
    assert_eq!(insights.overall_sentiment, Sentiment::Mixed);
    assert_eq!(insights.total_reviews_analyzed, 12);
    assert_eq!(insights.health_concerns[0].concern, "skin rash");

    let calls = fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].include_reviews);
    assert_eq!(
        analyst.calls(),
        vec![MockAnalystCall::ExtractReviews { url: URL.to_string() }]
    );

    assert_eq!(store.review_count(), 1);
    let stored = store.get_cached_reviews(&fingerprint).await.unwrap().unwrap();
    assert_eq!(stored.insights, insights);
}

#[tokio::test]
async fn test_cached_insights_skip_fetch() {
    let store = analyzed_store().await;
    let fetcher = MockFetcher::new().with_review_text(REVIEW_TEXT);
    let analyst = MockAnalyst::new();
    let extractor = extractor(store, fetcher.clone(), analyst.clone());
    let fingerprint = Fingerprint::of(URL);

    let first = extractor.get_review_insights(&fingerprint, false).await.unwrap();
    let second = extractor.get_review_insights(&fingerprint, false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(analyst.calls().len(), 1);
}

#[tokio::test]
async fn test_force_refresh_extracts_again() {
    let store = analyzed_store().await;
    let fetcher = MockFetcher::new().with_review_text(REVIEW_TEXT);
    let extractor = extractor(store.clone(), fetcher.clone(), MockAnalyst::new());
    let fingerprint = Fingerprint::of(URL);

    assert_ok!(extractor.get_review_insights(&fingerprint, false).await);
    assert_ok!(extractor.get_review_insights(&fingerprint, true).await);

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(store.review_count(), 1);
}

#[tokio::test]
async fn test_short_review_text_is_no_reviews() {
    let store = analyzed_store().await;
    let analyst = MockAnalyst::new();
    let extractor = extractor(
        store,
        MockFetcher::new().with_review_text("=== reviews ===\nGreat pan."),
        analyst.clone(),
    );

    let err = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::NoReviewsAvailable { ref url } if url == URL));
    assert_eq!(err.stage(), Stage::Reviews);
    assert_eq!(analyst.calls().len(), 0);
}

#[tokio::test]
async fn test_page_without_reviews_is_no_reviews() {
    let store = analyzed_store().await;
    let extractor = extractor(store, MockFetcher::new(), MockAnalyst::new());

    let err = assert_err!(
        extractor
            .get_review_insights(&Fingerprint::of(URL), false)
            .await
    );
    assert!(matches!(err, AnalysisError::NoReviewsAvailable { .. }));
}

#[tokio::test]
async fn test_low_confidence_insights_rejected() {
    let store = analyzed_store().await;
    let payload = ReviewInsightsPayload {
        confidence: 0.1,
        ..sample_reviews_payload()
    };
    let extractor = extractor(
        store.clone(),
        MockFetcher::new().with_review_text(REVIEW_TEXT),
        MockAnalyst::new().with_reviews(payload),
    );

    let err = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::ReviewExtractionFailed { ref reason, .. } if reason.contains("confidence")
    ));
    assert_eq!(store.review_count(), 0);
}

#[tokio::test]
async fn test_rate_limited_review_extraction() {
    let store = analyzed_store().await;
    let analyst = MockAnalyst::new().failing_reviews(MockFailure::RateLimited);
    let extractor = extractor(
        store,
        MockFetcher::new().with_review_text(REVIEW_TEXT),
        analyst.clone(),
    );

    let err = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::RateLimited {
            stage: Stage::Reviews,
            attempts: 4,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(analyst.calls().len(), 4);
}

#[tokio::test]
async fn test_review_extraction_error_not_retried() {
    let store = analyzed_store().await;
    let analyst = MockAnalyst::new().failing_reviews(MockFailure::Error("malformed".into()));
    let extractor = extractor(
        store,
        MockFetcher::new().with_review_text(REVIEW_TEXT),
        analyst.clone(),
    );

    let err = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::ReviewExtractionFailed { .. }));
    assert_eq!(analyst.calls().len(), 1);
}

#[tokio::test]
async fn test_review_fetch_failure() {
    let store = analyzed_store().await;
    let extractor = extractor(
        store,
        MockFetcher::new().failing(MockFailure::Error("connection reset".into())),
        MockAnalyst::new(),
    );

    let err = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::ScrapeFailed {
            stage: Stage::Reviews,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cache_write_failure_still_returns_insights() {
    let store = analyzed_store().await;
    store.set_fail_writes(true);
    let extractor = extractor(
        store.clone(),
        MockFetcher::new().with_review_text(REVIEW_TEXT),
        MockAnalyst::new(),
    );

    assert_ok!(
        extractor
            .get_review_insights(&Fingerprint::of(URL), false)
            .await
    );
    assert_eq!(store.review_count(), 0);
}

#[tokio::test]
async fn test_odd_fingerprint_with_subscriber_is_not_found() {
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .finish(),
    );
    // Multi-byte character straddling the short-form cut
    let fingerprint: Fingerprint =
        serde_json::from_str("\"aaaaaaaaaaaaaaa\u{e9}bbb\"").unwrap();
    let extractor = extractor(
        Arc::new(MemoryStore::new()),
        MockFetcher::new().with_review_text(REVIEW_TEXT),
        MockAnalyst::new(),
    );

    let err = extractor
        .get_review_insights(&fingerprint, false)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::NotFound { .. }));
}

#[tokio::test]
async fn test_cancel_during_hung_lookup() {
    let store = SlowStore {
        inner: analyzed_store().await,
        hang_lookup: true,
        ..SlowStore::default()
    };
    let fetcher = MockFetcher::new().with_review_text(REVIEW_TEXT);
    let extractor =
        ReviewInsightsExtractor::with_config(store, fetcher.clone(), MockAnalyst::new(), fast_config());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = extractor
        .get_review_insights_with_cancel(&Fingerprint::of(URL), false, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Cancelled {
            stage: Stage::Reviews,
            ..
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_hung_review_write_still_returns_insights() {
    let inner = analyzed_store().await;
    let store = SlowStore {
        inner: inner.clone(),
        hang_review_write: true,
        ..SlowStore::default()
    };
    let extractor = ReviewInsightsExtractor::with_config(
        store,
        MockFetcher::new().with_review_text(REVIEW_TEXT),
        MockAnalyst::new().with_reviews(sample_reviews_payload()),
        fast_config().with_timeouts(Duration::from_millis(200)),
    );

    let started = Instant::now();
    let insights = extractor
        .get_review_insights(&Fingerprint::of(URL), false)
        .await
        .unwrap();

    assert_eq!(insights.product_url, URL);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(inner.review_count(), 0);
}

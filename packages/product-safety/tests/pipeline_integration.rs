//! Integration tests for the analysis pipeline.
//!
//! Drives the Analyzer end to end through the in-crate mocks.

use std::time::Duration;

use product_safety::testing::{
    sample_enrichment, seeded_store, MockAnalyst, MockAnalystCall, MockFailure, MockFetcher,
};
use product_safety::types::detection::{AI_ANALYSIS, DATABASE_MATCH};
use product_safety::{
    AnalysisError, AnalysisMode, AnalysisRequest, Analyzer, ExtractedProduct, Fingerprint,
    KnowledgeStore, MemoryStore, PipelineConfig, RetryPolicy, RiskLevel, Stage,
};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://www.amazon.com/dp/B000PAN123";

/// Default thresholds, millisecond backoff.
fn fast_config() -> PipelineConfig {
    PipelineConfig::default().with_retry(
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5)),
    )
}

fn pan() -> ExtractedProduct {
    ExtractedProduct::new("Acme Nonstick Pan")
        .with_brand("Acme")
        .with_category("cookware")
        .with_ingredients(["PTFE coating", "aluminum"])
        .with_confidence(0.9)
}

fn analyzer(
    store: MemoryStore,
    fetcher: MockFetcher,
    analyst: MockAnalyst,
) -> Analyzer<MemoryStore, MockFetcher, MockAnalyst> {
    Analyzer::with_config(store, fetcher, analyst, fast_config())
}

#[tokio::test]
async fn test_full_pipeline() {
    let fetcher = MockFetcher::new();
    let analyst = MockAnalyst::new()
        .with_product(pan())
        .with_enrichment(sample_enrichment());
    let analyzer = analyzer(seeded_store(), fetcher.clone(), analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();

    assert_eq!(response.mode, AnalysisMode::Full);
    assert!(!response.cached);
    assert!(response.persisted);
    assert!(response.notes.is_empty());

    let analysis = &response.analysis;
    assert_eq!(analysis.product_name, "Acme Nonstick Pan");
    assert_eq!(analysis.retailer, "Amazon.com");
    assert_eq!(analysis.allergens_detected.len(), 1);
    assert_eq!(analysis.allergens_detected[0].name, "nickel");

    // The database PTFE match is covered by the AI record
    assert_eq!(analysis.pfas_detected.len(), 1);
    assert_eq!(analysis.pfas_detected[0].source, "coating");
    assert_eq!(analysis.other_concerns.len(), 1);

    // nickel 18*0.6 + PTFE 40*0.95 + aluminum 8*0.5 = 52.8
    assert_eq!(response.harm_score, 52);
    assert_eq!(response.risk_level, RiskLevel::Moderate);
    assert_eq!(analysis.overall_score, 48);
    assert_eq!(analysis.confidence, 0.85);

    assert_eq!(fetcher.calls().len(), 1);
    assert!(!fetcher.calls()[0].include_reviews);
    assert_eq!(
        analyst.calls(),
        vec![
            MockAnalystCall::Extract { url: URL.to_string() },
            MockAnalystCall::Enrich {
                target: "Acme Nonstick Pan".to_string(),
                combined: false,
                allergen_profile: vec![],
            },
        ]
    );
    assert_eq!(analyzer.store().analysis_count(), 1);
    assert_eq!(analyzer.store().searches(), vec![URL.to_string()]);
}

#[tokio::test]
async fn test_low_confidence_scrape_uses_combined_fallback() {
    let fetcher = MockFetcher::new().with_confidence(0.1);
    let analyst = MockAnalyst::new().with_combined(sample_enrichment());
    let analyzer = analyzer(seeded_store(), fetcher, analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();

    assert_eq!(response.mode, AnalysisMode::Fallback);
    assert_eq!(response.analysis.product_name, "Acme Nonstick Pan");
    assert_eq!(response.analysis.pfas_detected.len(), 1);
    assert!(response.notes[0].contains("Structured scraping unavailable"));
    assert!(response.persisted);

    assert_eq!(analyst.extract_calls(), 0);
    assert!(matches!(
        &analyst.calls()[0],
        MockAnalystCall::Enrich { combined: true, target, .. } if target == URL
    ));
}

#[tokio::test]
async fn test_failed_scrape_uses_combined_fallback() {
    let analyst = MockAnalyst::new().with_combined(sample_enrichment());
    let analyzer = analyzer(
        seeded_store(),
        MockFetcher::new().with_failed_scrape("HTTP 503"),
        analyst,
    );

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::Fallback);
    assert!(response.notes[0].contains("HTTP 503"));
}

#[tokio::test]
async fn test_low_confidence_extraction_uses_combined_fallback() {
    let analyst = MockAnalyst::new()
        .with_product(pan().with_confidence(0.1))
        .with_combined(sample_enrichment());
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::Fallback);
    assert_eq!(analyst.extract_calls(), 1);
    assert_eq!(analyst.enrich_calls(), 1);
}

#[tokio::test]
async fn test_extractor_error_reason_reaches_notes() {
    let analyst = MockAnalyst::new()
        .failing_extract(MockFailure::Error("model offline".into()))
        .with_combined(sample_enrichment());
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();

    assert_eq!(response.mode, AnalysisMode::Fallback);
    assert!(response.notes[0].contains("model offline"));
    assert_eq!(analyst.extract_calls(), 1);
}

#[tokio::test]
async fn test_summary_and_category_are_persisted() {
    let analyst = MockAnalyst::new()
        .with_product(pan())
        .with_enrichment(sample_enrichment());
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst);

    assert_ok!(analyzer.analyze(&AnalysisRequest::new(URL)).await);

    let record = analyzer
        .store()
        .get_cached(&Fingerprint::of(URL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.summary(), Some("Nonstick coating contains PTFE."));
    assert_eq!(record.product_category(), Some("cookware"));
    assert_eq!(record.category, "Amazon.com");
}

#[tokio::test]
async fn test_fallback_matches_reported_ingredients() {
    let mut combined = sample_enrichment();
    combined.pfas_detected.clear();
    combined.confidence = None;
    let analyzer = analyzer(
        seeded_store(),
        MockFetcher::new().with_confidence(0.1),
        MockAnalyst::new().with_combined(combined),
    );

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    let pfas = &response.analysis.pfas_detected;
    assert_eq!(pfas.len(), 1);
    assert_eq!(pfas[0].name, "PTFE");
    assert_eq!(pfas[0].source, DATABASE_MATCH);
    assert_eq!(response.analysis.confidence, 1.0);
}

#[tokio::test]
async fn test_rate_limited_enrichment_degrades_to_database_only() {
    let analyst = MockAnalyst::new()
        .with_product(pan().with_ingredients(["PTFE coating", "parfum"]))
        .rate_limited();
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();

    assert_eq!(response.mode, AnalysisMode::DatabaseOnly);
    assert_eq!(response.notes.len(), 1);
    assert!(response.notes[0].contains("rate limited after 4 attempts"));
    assert!(response.notes[0].contains("database matches only"));

    let analysis = &response.analysis;
    assert_eq!(analysis.allergens_detected.len(), 1);
    assert_eq!(analysis.allergens_detected[0].name, "fragrance");
    assert_eq!(analysis.pfas_detected[0].name, "PTFE");
    assert!(analysis
        .allergens_detected
        .iter()
        .all(|d| d.source == DATABASE_MATCH));

    // fragrance (moderate) 18 + PTFE 40
    assert_eq!(response.harm_score, 58);

    // Initial attempt plus three retries
    assert_eq!(analyst.enrich_calls(), 4);
}

#[tokio::test]
async fn test_enrichment_recovers_after_transient_failures() {
    let analyst = MockAnalyst::new()
        .with_product(pan())
        .with_enrichment(sample_enrichment())
        .failing_enrich_times(MockFailure::Overloaded, 2);
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::Full);
    assert_eq!(analyst.enrich_calls(), 3);
    assert_eq!(response.analysis.allergens_detected[0].source, "handle rivets");
}

#[tokio::test]
async fn test_enrichment_error_degrades_without_retry() {
    let analyst = MockAnalyst::new()
        .with_product(pan())
        .failing_enrich(MockFailure::Error("schema mismatch".into()));
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst.clone());

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::DatabaseOnly);
    assert!(response.notes[0].starts_with("AI enrichment failed"));
    assert!(response.notes[0].contains("schema mismatch"));
    assert_eq!(analyst.enrich_calls(), 1);
}

#[tokio::test]
async fn test_rate_limited_fallback_is_retryable_error() {
    let analyst = MockAnalyst::new().rate_limited();
    let analyzer = analyzer(
        seeded_store(),
        MockFetcher::new().with_confidence(0.1),
        analyst.clone(),
    );

    let err = analyzer
        .analyze(&AnalysisRequest::new(URL))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::RateLimited {
            stage: Stage::ErrorFallback,
            attempts: 4,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(analyzer.store().analysis_count(), 0);
}

#[tokio::test]
async fn test_failed_fallback_is_enrichment_error() {
    let analyzer = analyzer(
        seeded_store(),
        MockFetcher::new().with_confidence(0.1),
        MockAnalyst::new().failing_enrich(MockFailure::Error("bad gateway".into())),
    );

    let err = analyzer
        .analyze(&AnalysisRequest::new(URL))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::EnrichmentFailed { .. }));
    assert_eq!(err.stage(), Stage::ErrorFallback);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_cache_hit_skips_pipeline() {
    let fetcher = MockFetcher::new();
    let analyst = MockAnalyst::new()
        .with_product(pan())
        .with_enrichment(sample_enrichment());
    let analyzer = analyzer(seeded_store(), fetcher.clone(), analyst.clone());

    let first = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    let second = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();

    assert!(second.cached);
    assert_eq!(second.mode, AnalysisMode::Cached);
    assert!(second.cache_age_seconds.unwrap() >= 0);
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(analyst.enrich_calls(), 1);

    // Stored harm score converts back to the same overall score
    assert_eq!(second.harm_score, first.harm_score);
    assert_eq!(second.analysis.overall_score, first.analysis.overall_score);
    assert_eq!(second.analysis.ingredients, first.analysis.ingredients);
    assert_eq!(second.analysis.confidence, first.analysis.confidence);
    assert_eq!(second.analysis.pfas_detected, first.analysis.pfas_detected);
}

#[tokio::test]
async fn test_cache_key_ignores_fragment_and_whitespace() {
    let fetcher = MockFetcher::new();
    let analyzer = analyzer(seeded_store(), fetcher.clone(), MockAnalyst::new());

    assert_ok!(analyzer.analyze(&AnalysisRequest::new(URL)).await);
    let again = analyzer
        .analyze(&AnalysisRequest::new(format!("  {}#reviews ", URL)))
        .await
        .unwrap();

    assert!(again.cached);
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_force_refresh_recomputes() {
    let fetcher = MockFetcher::new();
    let analyzer = analyzer(seeded_store(), fetcher.clone(), MockAnalyst::new());

    analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    let refreshed = analyzer
        .analyze(&AnalysisRequest::new(URL).force_refresh())
        .await
        .unwrap();

    assert!(!refreshed.cached);
    assert_eq!(refreshed.mode, AnalysisMode::Full);
    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(analyzer.store().analysis_count(), 1);
}

#[tokio::test]
async fn test_unavailable_store_still_analyzes() {
    let store = seeded_store();
    store.set_available(false);
    let analyzer = analyzer(
        store,
        MockFetcher::new(),
        MockAnalyst::new()
            .with_product(pan())
            .with_enrichment(sample_enrichment()),
    );

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::Full);
    assert!(!response.persisted);
    assert_eq!(analyzer.store().analysis_count(), 0);

    // No reference tables: only the AI records remain
    assert!(response
        .analysis
        .pfas_detected
        .iter()
        .all(|d| d.source != DATABASE_MATCH));
}

#[tokio::test]
async fn test_store_read_failure_is_cache_miss() {
    let store = seeded_store();
    store.set_fail_reads(true);
    let analyzer = analyzer(store, MockFetcher::new(), MockAnalyst::new().with_product(pan()));

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::Full);
    assert!(response.persisted);
}

#[tokio::test]
async fn test_persistence_failure_is_not_fatal() {
    let store = seeded_store();
    store.set_fail_writes(true);
    let analyzer = analyzer(
        store,
        MockFetcher::new(),
        MockAnalyst::new()
            .with_product(pan())
            .with_enrichment(sample_enrichment()),
    );

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert!(!response.persisted);
    assert_eq!(response.harm_score, 52);
    assert_eq!(analyzer.store().write_count(), 0);
}

#[tokio::test]
async fn test_allergen_profile_reaches_enricher() {
    let analyst = MockAnalyst::new().with_product(pan());
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst.clone());

    let request = AnalysisRequest::new(URL).with_allergen_profile(["peanut", "latex"]);
    analyzer.analyze(&request).await.unwrap();

    assert!(analyst.calls().iter().any(|c| matches!(
        c,
        MockAnalystCall::Enrich { allergen_profile, .. }
            if allergen_profile == &vec!["peanut".to_string(), "latex".to_string()]
    )));
}

#[tokio::test]
async fn test_fetch_timeout_falls_back() {
    let analyzer = Analyzer::with_config(
        seeded_store(),
        MockFetcher::new().with_delay(Duration::from_millis(500)),
        MockAnalyst::new().with_combined(sample_enrichment()),
        fast_config().with_timeouts(Duration::from_millis(50)),
    );

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.mode, AnalysisMode::Fallback);
    assert!(response.notes[0].contains("timed out"));
}

#[tokio::test]
async fn test_cancellation_aborts_run() {
    let analyst = MockAnalyst::new().with_delay(Duration::from_secs(10));
    let analyzer = analyzer(seeded_store(), MockFetcher::new(), analyst);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = analyzer
        .analyze_with_cancel(&AnalysisRequest::new(URL), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Cancelled {
            stage: Stage::Extracting,
            ..
        }
    ));
    assert_eq!(analyzer.store().analysis_count(), 0);
}

#[tokio::test]
async fn test_independent_requests_run_concurrently() {
    let analyzer = analyzer(
        seeded_store(),
        MockFetcher::new(),
        MockAnalyst::new().with_product(pan()),
    );

    let a = AnalysisRequest::new("https://www.amazon.com/dp/A");
    let b = AnalysisRequest::new("https://www.amazon.ca/dp/B");
    let (ra, rb) = tokio::join!(analyzer.analyze(&a), analyzer.analyze(&b));

    assert_eq!(ra.unwrap().analysis.retailer, "Amazon.com");
    assert_eq!(rb.unwrap().analysis.retailer, "Amazon.ca");
    assert_eq!(analyzer.store().analysis_count(), 2);
}

#[tokio::test]
async fn test_ai_source_defaults_when_missing() {
    let mut enrichment = sample_enrichment();
    enrichment.allergens_detected[0].source = None;
    let analyzer = analyzer(
        seeded_store(),
        MockFetcher::new(),
        MockAnalyst::new()
            .with_product(pan())
            .with_enrichment(enrichment),
    );

    let response = analyzer.analyze(&AnalysisRequest::new(URL)).await.unwrap();
    assert_eq!(response.analysis.allergens_detected[0].source, AI_ANALYSIS);
    assert!(analyzer
        .store()
        .get_cached(&product_safety::Fingerprint::of(URL))
        .await
        .unwrap()
        .is_some());
}

//! Product Safety Analysis Library
//!
//! Scores retail products for allergens, PFAS ("forever chemicals") and
//! other toxins. A product URL goes through a staged pipeline: scrape the
//! page, extract structured data, match it against reference tables, let
//! an AI enricher reason over it, merge both views, and reduce everything
//! to a 0-100 harm score.
//!
//! # Design Philosophy
//!
//! - Deterministic matches are the floor; AI only adds to them
//! - Every external fault has a fallback or a degrade path
//! - Collaborators sit behind traits so the pipeline runs on mocks
//!
//! # Usage
//!
//! ```rust,ignore
//! use product_safety::{Analyzer, AnalysisRequest, MemoryStore};
//! use product_safety::testing::{MockAnalyst, MockFetcher};
//!
//! let analyzer = Analyzer::new(MemoryStore::new(), MockFetcher::new(), MockAnalyst::new());
//!
//! let request = AnalysisRequest::new("https://www.amazon.com/dp/B000000000")
//!     .with_allergen_profile(["peanut"]);
//! let response = analyzer.analyze(&request).await?;
//! println!("{} ({})", response.harm_score, response.risk_level);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator interfaces (KnowledgeStore, PageFetcher, Extractor, Enricher)
//! - [`types`] - Detections, products, results and configuration
//! - [`pipeline`] - Matching, scoring, merging and the orchestrators
//! - [`stores`] - Knowledge store implementations (MemoryStore, SqliteStore)
//! - [`fetchers`] - Page fetchers (HttpPageFetcher, RateLimitedFetcher)
//! - [`ai`] - OpenAI-backed extractor and enricher
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod fetchers;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{
    AnalysisError, PipelineResult, ServiceError, ServiceResult, Stage, StoreError, StoreResult,
};
pub use fetchers::{FetcherExt, HttpPageFetcher, RateLimitedFetcher};
pub use pipeline::{Analyzer, ReviewInsightsExtractor, ScoreBreakdown};
pub use traits::{
    ai::{EnrichmentInput, Enricher, Extractor},
    fetcher::PageFetcher,
    store::KnowledgeStore,
};
pub use types::{
    analysis::{
        AnalysisMode, AnalysisRequest, AnalysisResponse, AnalysisResult, Fingerprint, RiskLevel,
        StoredAnalysis,
    },
    config::{PipelineConfig, RetryPolicy},
    detection::{
        AllergenDetection, ConcernDetection, Detection, DetectionSet, PfasDetection, Severity,
        Substance,
    },
    product::{ExtractedProduct, ProductLabel, ScrapedContent},
    reference::{AllergenRef, PfasRef, ReferenceTables},
    reviews::{ReviewInsights, ReviewInsightsPayload, Sentiment, StoredReviews},
};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

#[cfg(feature = "openai")]
pub use ai::OpenAiAnalyst;

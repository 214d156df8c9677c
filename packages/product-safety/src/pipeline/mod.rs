//! Analysis pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Cache check against the knowledge store
//! - Scraping and structured extraction
//! - Deterministic reference matching
//! - AI enrichment with backoff and database-only degradation
//! - Merging, scoring and write-through persistence
//! - Review insights, as a separate pipeline

pub mod analyzer;
pub mod matcher;
pub mod merge;
pub mod prompts;
pub mod retry;
pub mod reviews;
pub mod score;
pub mod validate;

pub use analyzer::Analyzer;
pub use matcher::{match_against, match_ingredients, MatchResult};
pub use merge::{merge, merge_detections};
pub use prompts::{
    format_enrich_page, format_enrich_product, format_enrich_system, format_extract_product,
    format_extract_reviews, ENRICH_PROMPT, EXTRACT_PRODUCT_PROMPT, EXTRACT_REVIEWS_PROMPT,
};
pub use retry::{call_once, call_with_retry, store_call, CallFailure};
pub use reviews::ReviewInsightsExtractor;
pub use score::{breakdown, calculate, category_multiplier, ScoreBreakdown};
pub use validate::{
    audit_unreferenced, extract_json_object, parse_model_json, validate_payload, EnrichedAnalysis,
    RawAllergen, RawConcern, RawDetectionPayload, RawPfas,
};

//! Analysis requests, results, and the persisted record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use super::product_url::Fingerprint;
use super::detection::{AllergenDetection, ConcernDetection, DetectionSet, PfasDetection};

/// Confidence assumed for cached records whose raw payload lacks one.
const CACHED_CONFIDENCE_DEFAULT: f32 = 0.8;

/// Human-readable band for a harm score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Safe,
    Moderate,
    High,
    Dangerous,
}

impl RiskLevel {
    /// Band for a harm score: `<=30` Safe, `<=60` Moderate, `<=80` High, else Dangerous.
    pub fn from_harm_score(harm_score: u8) -> Self {
        match harm_score {
            0..=30 => RiskLevel::Safe,
            31..=60 => RiskLevel::Moderate,
            61..=80 => RiskLevel::High,
            _ => RiskLevel::Dangerous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::Dangerous => "Dangerous",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Served from the knowledge store
    Cached,
    /// Scrape, extract, match, enrich, merge
    Full,
    /// Enrichment skipped; database matches only
    DatabaseOnly,
    /// Scraping/extraction unusable; single combined fetch+enrich call
    Fallback,
}

/// A request to analyze one product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub url: String,
    #[serde(default)]
    pub allergen_profile: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_allergen_profile(
        mut self,
        allergens: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allergen_profile = allergens.into_iter().map(Into::into).collect();
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

/// The scored analysis of a product.
///
/// `overall_score` is a safety score: always `100 - harm_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub product_url: String,
    pub product_name: String,
    pub brand: String,
    pub retailer: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub overall_score: u8,
    #[serde(default)]
    pub allergens_detected: Vec<AllergenDetection>,
    #[serde(default)]
    pub pfas_detected: Vec<PfasDetection>,
    #[serde(default)]
    pub other_concerns: Vec<ConcernDetection>,
    pub confidence: f32,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Harm score this result was derived from.
    pub fn harm_score(&self) -> u8 {
        100u8.saturating_sub(self.overall_score)
    }

    pub fn detections(&self) -> DetectionSet {
        DetectionSet {
            allergens: self.allergens_detected.clone(),
            pfas: self.pfas_detected.clone(),
            other_concerns: self.other_concerns.clone(),
        }
    }
}

/// What `analyze` hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: AnalysisResult,
    pub harm_score: u8,
    pub risk_level: RiskLevel,
    pub cached: bool,
    pub cache_age_seconds: Option<i64>,
    pub mode: AnalysisMode,
    /// Degradation notes, e.g. skipped enrichment
    #[serde(default)]
    pub notes: Vec<String>,
    /// Whether the write-through to the knowledge store succeeded
    pub persisted: bool,
}

/// Record shape written to the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub url_hash: Fingerprint,
    pub product_url: String,
    pub product_name: String,
    pub brand: String,
    pub category: String,
    pub harm_score: u8,
    #[serde(default)]
    pub allergens: Vec<AllergenDetection>,
    #[serde(default)]
    pub pfas_compounds: Vec<PfasDetection>,
    #[serde(default)]
    pub other_concerns: Vec<ConcernDetection>,
    /// Full payload: the result plus mode and notes
    #[serde(default)]
    pub raw_analysis: serde_json::Value,
    pub analyzed_at: DateTime<Utc>,
}

impl StoredAnalysis {
    /// Build the record for a freshly computed result.
    pub fn from_result(
        fingerprint: &Fingerprint,
        result: &AnalysisResult,
        mode: AnalysisMode,
        notes: &[String],
    ) -> Self {
        let raw_analysis = serde_json::json!({
            "analysis": result,
            "ingredients": result.ingredients,
            "confidence": result.confidence,
            "mode": mode,
            "notes": notes,
        });

        Self {
            url_hash: fingerprint.clone(),
            product_url: result.product_url.clone(),
            product_name: result.product_name.clone(),
            brand: result.brand.clone(),
            category: result.retailer.clone(),
            harm_score: result.harm_score(),
            allergens: result.allergens_detected.clone(),
            pfas_compounds: result.pfas_detected.clone(),
            other_concerns: result.other_concerns.clone(),
            raw_analysis,
            analyzed_at: result.analyzed_at,
        }
    }

    /// Attach the enricher's own summary under `raw_analysis.enrichment`.
    pub fn with_summary(mut self, summary: Option<&str>) -> Self {
        if let (Some(summary), Some(raw)) = (summary, self.raw_analysis.as_object_mut()) {
            raw.insert(
                "enrichment".to_string(),
                serde_json::json!({ "summary": summary }),
            );
        }
        self
    }

    /// Record the extracted product category the score was computed with.
    ///
    /// `category` holds the retailer, so the real one lives in `raw_analysis`.
    pub fn with_product_category(mut self, category: &str) -> Self {
        if let Some(raw) = self.raw_analysis.as_object_mut() {
            raw.insert("product_category".to_string(), category.into());
        }
        self
    }

    pub fn summary(&self) -> Option<&str> {
        self.raw_analysis
            .get("enrichment")
            .and_then(|e| e.get("summary"))
            .and_then(|v| v.as_str())
    }

    pub fn product_category(&self) -> Option<&str> {
        self.raw_analysis
            .get("product_category")
            .and_then(|v| v.as_str())
    }

    /// Rebuild the result this record was stored from.
    pub fn to_result(&self) -> AnalysisResult {
        let ingredients = self
            .raw_analysis
            .get("ingredients")
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or_default();
        let confidence = self
            .raw_analysis
            .get("confidence")
            .and_then(|v| v.as_f64())
            .map(|c| c as f32)
            .unwrap_or(CACHED_CONFIDENCE_DEFAULT);

        AnalysisResult {
            product_url: self.product_url.clone(),
            product_name: self.product_name.clone(),
            brand: self.brand.clone(),
            retailer: self.category.clone(),
            ingredients,
            overall_score: 100u8.saturating_sub(self.harm_score.min(100)),
            allergens_detected: self.allergens.clone(),
            pfas_detected: self.pfas_compounds.clone(),
            other_concerns: self.other_concerns.clone(),
            confidence,
            analyzed_at: self.analyzed_at,
        }
    }

    /// Age of the record in whole seconds (never negative).
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.analyzed_at).num_seconds().max(0)
    }
}

//! Schema and range checks on enrichment payloads.
//!
//! Model output is parsed into permissive `Raw*` types (every field
//! optional) and then converted into typed detections. The checks are
//! structural only: whether a substance really belongs in a category is
//! left to the enricher.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::detection::{
    AllergenDetection, ConcernDetection, DetectionSet, PfasDetection, Severity, AI_ANALYSIS,
    DATABASE_MATCH,
};
use crate::types::reference::ReferenceTables;

/// Category used for other concerns that arrive without one.
pub const DEFAULT_CONCERN_CATEGORY: &str = "other";

/// Enrichment payload exactly as the enricher returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDetectionPayload {
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub retailer: Option<String>,
    pub category: Option<String>,
    pub ingredients: Vec<String>,
    pub allergens_detected: Vec<RawAllergen>,
    pub pfas_detected: Vec<RawPfas>,
    pub other_concerns: Vec<RawConcern>,
    pub confidence: Option<f32>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAllergen {
    pub name: Option<String>,
    pub severity: Option<String>,
    pub source: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPfas {
    pub name: Option<String>,
    pub cas_number: Option<String>,
    pub body_effects: Option<String>,
    pub source: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConcern {
    pub name: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub confidence: Option<f32>,
}

/// A validated enrichment payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedAnalysis {
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub retailer: Option<String>,
    pub category: Option<String>,
    pub ingredients: Vec<String>,
    pub detections: DetectionSet,
    /// Overall confidence, clamped to `[0, 1]`
    pub confidence: Option<f32>,
    pub summary: Option<String>,
}

/// Convert a raw payload into typed detections.
///
/// Names are trimmed and entries without one are dropped. Confidence is
/// clamped to `[0, 1]` (missing means 1.0, NaN means 0). Unknown severity
/// becomes `low`.
pub fn validate_payload(raw: RawDetectionPayload) -> EnrichedAnalysis {
    let allergens: Vec<AllergenDetection> = raw
        .allergens_detected
        .into_iter()
        .filter_map(|a| {
            let name = non_empty(a.name)?;
            Some(AllergenDetection {
                name,
                severity: severity_of(a.severity.as_deref()),
                source: non_empty(a.source).unwrap_or_else(|| AI_ANALYSIS.to_string()),
                confidence: detection_confidence(a.confidence),
            })
        })
        .collect();

    let pfas: Vec<PfasDetection> = raw
        .pfas_detected
        .into_iter()
        .filter_map(|p| {
            let name = non_empty(p.name)?;
            Some(PfasDetection {
                name,
                cas_number: non_empty(p.cas_number),
                body_effects: non_empty(p.body_effects).unwrap_or_default(),
                source: non_empty(p.source).unwrap_or_else(|| AI_ANALYSIS.to_string()),
                confidence: detection_confidence(p.confidence),
            })
        })
        .collect();

    let other_concerns: Vec<ConcernDetection> = raw
        .other_concerns
        .into_iter()
        .filter_map(|c| {
            let name = non_empty(c.name)?;
            Some(ConcernDetection {
                name,
                category: non_empty(c.category)
                    .unwrap_or_else(|| DEFAULT_CONCERN_CATEGORY.to_string()),
                severity: severity_of(c.severity.as_deref()),
                description: non_empty(c.description).unwrap_or_default(),
                confidence: detection_confidence(c.confidence),
            })
        })
        .collect();

    EnrichedAnalysis {
        product_name: non_empty(raw.product_name),
        brand: non_empty(raw.brand),
        retailer: non_empty(raw.retailer),
        category: non_empty(raw.category),
        ingredients: raw
            .ingredients
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect(),
        detections: DetectionSet {
            allergens,
            pfas,
            other_concerns,
        },
        confidence: raw.confidence.map(clamp_confidence),
        summary: non_empty(raw.summary),
    }
}

/// Log AI detections that the reference tables do not know about.
///
/// Observability only: the detections are kept as reported.
pub fn audit_unreferenced(
    detections: &DetectionSet,
    refs: &ReferenceTables,
    product_url: &str,
    product_name: &str,
) -> usize {
    if refs.is_empty() {
        debug!("Reference tables empty, skipping unreferenced-substance audit");
        return 0;
    }

    let mut flagged = 0;

    for allergen in detections
        .allergens
        .iter()
        .filter(|a| a.source != DATABASE_MATCH)
    {
        if !refs.knows_allergen(&allergen.name) {
            flagged += 1;
            warn!(
                url = %product_url,
                product = %product_name,
                substance = %allergen.name,
                severity = %allergen.severity,
                confidence = allergen.confidence,
                "AI reported allergen not in reference table"
            );
        }
    }

    for pfas in detections
        .pfas
        .iter()
        .filter(|p| p.source != DATABASE_MATCH)
    {
        let known = refs.knows_pfas(&pfas.name)
            || pfas
                .cas_number
                .as_deref()
                .is_some_and(|cas| refs.knows_pfas(cas));
        if !known {
            flagged += 1;
            warn!(
                url = %product_url,
                product = %product_name,
                substance = %pfas.name,
                cas_number = ?pfas.cas_number,
                confidence = pfas.confidence,
                "AI reported PFAS not in reference table"
            );
        }
    }

    flagged
}

/// Pull the JSON object out of free-form model text.
///
/// Accepts a fenced ```json block, any fenced block, or the outermost
/// `{ ... }` span, in that order.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = text.trim();

    let fenced = if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        Some(body.find("```").map_or(body, |end| &body[..end]))
    } else if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        Some(body.find("```").map_or(body, |end| &body[..end]))
    } else {
        None
    };

    let candidate = fenced.unwrap_or(text);
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    (end > start).then(|| candidate[start..=end].trim())
}

/// Parse model output into a typed payload.
pub fn parse_model_json<T: serde::de::DeserializeOwned>(
    text: &str,
) -> Result<T, serde_json::Error> {
    let json = extract_json_object(text).unwrap_or(text);
    serde_json::from_str(json)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn severity_of(label: Option<&str>) -> Severity {
    label.map(Severity::parse_lenient).unwrap_or_default()
}

fn detection_confidence(value: Option<f32>) -> f32 {
    value.map(clamp_confidence).unwrap_or(1.0)
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

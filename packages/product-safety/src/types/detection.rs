//! Detection types - the substances a product analysis reports.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Source tag for detections produced by deterministic reference matching.
pub const DATABASE_MATCH: &str = "database_match";

/// Source tag used when the AI payload omits one.
pub const AI_ANALYSIS: &str = "ai_analysis";

/// How harmful a detected substance is.
///
/// Ordered from least to most severe, so `Severity::High > Severity::Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Moderate,
    High,
    Severe,
}

impl Severity {
    /// All severities, least severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Moderate,
        Severity::High,
        Severity::Severe,
    ];

    /// Parse a severity label, falling back to `Low` for anything unknown.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "moderate" | "medium" => Severity::Moderate,
            "high" => Severity::High,
            "severe" | "critical" => Severity::Severe,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Model output is not trusted to stick to the four labels.
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.map(|l| Severity::parse_lenient(&l)).unwrap_or_default())
    }
}

/// Anything identified by a substance name.
pub trait Substance {
    fn name(&self) -> &str;

    /// Case-insensitive key used to decide whether two detections are the same substance.
    fn canonical_key(&self) -> String {
        canonical_name(self.name())
    }
}

/// Normalize a substance name for comparison.
pub fn canonical_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// An allergen found in the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergenDetection {
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    pub source: String,
    pub confidence: f32,
}

/// A PFAS compound found in the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PfasDetection {
    pub name: String,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub body_effects: String,
    pub source: String,
    pub confidence: f32,
}

/// Any other toxin concern (heavy metals, carcinogens, endocrine disruptors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcernDetection {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    pub confidence: f32,
}

impl AllergenDetection {
    /// A deterministic match against the reference table.
    pub fn database_match(name: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            severity,
            source: DATABASE_MATCH.to_string(),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

impl PfasDetection {
    /// A deterministic match against the reference table.
    pub fn database_match(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cas_number: None,
            body_effects: String::new(),
            source: DATABASE_MATCH.to_string(),
            confidence: 1.0,
        }
    }

    pub fn with_cas_number(mut self, cas: impl Into<String>) -> Self {
        self.cas_number = Some(cas.into());
        self
    }

    pub fn with_body_effects(mut self, effects: impl Into<String>) -> Self {
        self.body_effects = effects.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

impl ConcernDetection {
    pub fn new(name: impl Into<String>, category: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            severity,
            description: String::new(),
            confidence: 1.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

impl Substance for AllergenDetection {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Substance for PfasDetection {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Substance for ConcernDetection {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A single detection of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detection {
    Allergen(AllergenDetection),
    Pfas(PfasDetection),
    Other(ConcernDetection),
}

impl Detection {
    pub fn confidence(&self) -> f32 {
        match self {
            Detection::Allergen(d) => d.confidence,
            Detection::Pfas(d) => d.confidence,
            Detection::Other(d) => d.confidence,
        }
    }

    /// Severity label; PFAS carry none because they are scored as inherently high-risk.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Detection::Allergen(d) => Some(d.severity),
            Detection::Pfas(_) => None,
            Detection::Other(d) => Some(d.severity),
        }
    }
}

impl Substance for Detection {
    fn name(&self) -> &str {
        match self {
            Detection::Allergen(d) => &d.name,
            Detection::Pfas(d) => &d.name,
            Detection::Other(d) => &d.name,
        }
    }
}

/// Detections grouped by kind, as scored and reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSet {
    #[serde(default)]
    pub allergens: Vec<AllergenDetection>,
    #[serde(default)]
    pub pfas: Vec<PfasDetection>,
    #[serde(default)]
    pub other_concerns: Vec<ConcernDetection>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allergen(mut self, detection: AllergenDetection) -> Self {
        self.allergens.push(detection);
        self
    }

    pub fn with_pfas(mut self, detection: PfasDetection) -> Self {
        self.pfas.push(detection);
        self
    }

    pub fn with_concern(mut self, detection: ConcernDetection) -> Self {
        self.other_concerns.push(detection);
        self
    }

    pub fn len(&self) -> usize {
        self.allergens.len() + self.pfas.len() + self.other_concerns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every detection as the polymorphic [`Detection`].
    pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
        self.allergens
            .iter()
            .cloned()
            .map(Detection::Allergen)
            .chain(self.pfas.iter().cloned().map(Detection::Pfas))
            .chain(self.other_concerns.iter().cloned().map(Detection::Other))
    }
}

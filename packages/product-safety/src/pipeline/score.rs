//! Harm score calculation (0-100, higher is more harmful).
//!
//! Additive point model:
//!
//! 1. Each allergen/other concern contributes severity points times its confidence
//!    (`low=8, moderate=18, high=35, severe=50`).
//! 2. Each PFAS contributes a flat 40 points times its confidence.
//! 3. The sum is scaled by the first category multiplier whose keyword
//!    appears in the product name or category.
//! 4. Overall confidence below 0.7 adds `(0.7 - confidence) * 20`.
//! 5. If anything was detected, the score is at least 25.
//! 6. Clamped to `[0, 100]` and truncated.
//!
//! Every step is monotone in the detection set, so adding a detection or
//! raising a severity never lowers the score.

use serde::Serialize;

use crate::types::analysis::RiskLevel;
use crate::types::detection::{Detection, DetectionSet, Severity};
use crate::types::product::ProductLabel;

/// Points per PFAS detection at full confidence.
pub const PFAS_POINTS: f32 = 40.0;

/// Minimum score when at least one substance was detected.
pub const DETECTION_FLOOR: f32 = 25.0;

/// Overall confidence below which the precautionary penalty applies.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

const PENALTY_SCALE: f32 = 20.0;

/// Keyword to multiplier, scanned in order; the first hit wins.
///
/// "toxic" is deliberately absent: it would match "non-toxic".
pub const CATEGORY_MULTIPLIERS: &[(&str, f32)] = &[
    ("pesticide", 1.4),
    ("insecticide", 1.4),
    ("herbicide", 1.4),
    ("fungicide", 1.4),
    ("rodenticide", 1.4),
    ("disinfectant", 1.2),
    ("sanitizer", 1.2),
    ("bleach", 1.3),
    ("poison", 1.3),
    ("corrosive", 1.3),
    ("flammable", 1.3),
];

/// Base points for a severity label.
pub fn severity_points(severity: Severity) -> f32 {
    match severity {
        Severity::Low => 8.0,
        Severity::Moderate => 18.0,
        Severity::High => 35.0,
        Severity::Severe => 50.0,
    }
}

/// Weighted points a single detection contributes.
pub fn detection_points(detection: &Detection) -> f32 {
    let base = match detection.severity() {
        Some(severity) => severity_points(severity),
        None => PFAS_POINTS,
    };
    base * unit(detection.confidence())
}

/// First multiplier whose keyword occurs in the label, else 1.0.
pub fn category_multiplier(label: &ProductLabel) -> f32 {
    let haystack = format!("{} {}", label.name, label.category).to_lowercase();
    CATEGORY_MULTIPLIERS
        .iter()
        .find(|(keyword, _)| haystack.contains(keyword))
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(1.0)
}

/// Step-by-step record of a score computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub base_points: f32,
    pub multiplier: f32,
    pub confidence_penalty: f32,
    pub floor_applied: bool,
    pub harm_score: u8,
}

impl ScoreBreakdown {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_harm_score(self.harm_score)
    }
}

/// Compute the harm score with its intermediate values.
pub fn breakdown(detections: &DetectionSet, label: &ProductLabel, confidence: f32) -> ScoreBreakdown {
    let base_points: f32 = detections.iter().map(|d| detection_points(&d)).sum();
    let multiplier = category_multiplier(label);

    let confidence = unit(confidence);
    let confidence_penalty = if confidence < CONFIDENCE_THRESHOLD {
        (CONFIDENCE_THRESHOLD - confidence) * PENALTY_SCALE
    } else {
        0.0
    };

    let mut score = base_points * multiplier + confidence_penalty;

    let floor_applied = !detections.is_empty() && score < DETECTION_FLOOR;
    if floor_applied {
        score = DETECTION_FLOOR;
    }

    ScoreBreakdown {
        base_points,
        multiplier,
        confidence_penalty,
        floor_applied,
        harm_score: score.clamp(0.0, 100.0) as u8,
    }
}

/// Harm score in `[0, 100]`.
pub fn calculate(detections: &DetectionSet, label: &ProductLabel, confidence: f32) -> u8 {
    breakdown(detections, label, confidence).harm_score
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

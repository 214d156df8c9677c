//! Consumer review insights, produced independently of the harm score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::detection::Severity;
use super::product_url::Fingerprint;

/// Overall tone of the reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Mixed,
    Negative,
    #[default]
    Unknown,
}

impl Sentiment {
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "mixed" | "neutral" => Sentiment::Mixed,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for Sentiment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.map(|l| Sentiment::parse_lenient(&l)).unwrap_or_default())
    }
}

/// Count of reviews per star rating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingDistribution {
    #[serde(rename = "5_star")]
    pub five_star: u32,
    #[serde(rename = "4_star")]
    pub four_star: u32,
    #[serde(rename = "3_star")]
    pub three_star: u32,
    #[serde(rename = "2_star")]
    pub two_star: u32,
    #[serde(rename = "1_star")]
    pub one_star: u32,
}

impl RatingDistribution {
    pub fn total(&self) -> u32 {
        self.five_star + self.four_star + self.three_star + self.two_star + self.one_star
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Complaint {
    pub complaint: String,
    /// rare, occasional, common or frequent
    pub frequency: String,
    pub severity: Severity,
    pub examples: Vec<String>,
}

/// A health-related complaint (rash, irritation, allergic reaction).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConcern {
    pub concern: String,
    pub frequency: String,
    pub severity: Severity,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositiveFeedback {
    pub aspect: String,
    pub frequency: String,
}

/// A question from the Q&A section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionConcern {
    pub question: String,
    /// safety, ingredients, usage or other
    pub category: String,
    pub answered: bool,
}

/// Review insights as returned by an extractor, before they are keyed.
///
/// Every field defaults, so a partial model response still parses;
/// a missing `confidence` is 0 and therefore rejected downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewInsightsPayload {
    pub overall_sentiment: Sentiment,
    pub total_reviews_analyzed: u32,
    pub rating_distribution: RatingDistribution,
    pub common_complaints: Vec<Complaint>,
    pub health_concerns: Vec<HealthConcern>,
    pub positive_feedback: Vec<PositiveFeedback>,
    pub questions_concerns: Vec<QuestionConcern>,
    pub verified_purchase_ratio: f32,
    pub confidence: f32,
}

/// Review insights for a previously analyzed product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewInsights {
    pub fingerprint: Fingerprint,
    pub product_url: String,
    pub overall_sentiment: Sentiment,
    pub total_reviews_analyzed: u32,
    pub rating_distribution: RatingDistribution,
    #[serde(default)]
    pub common_complaints: Vec<Complaint>,
    #[serde(default)]
    pub health_concerns: Vec<HealthConcern>,
    #[serde(default)]
    pub positive_feedback: Vec<PositiveFeedback>,
    #[serde(default)]
    pub questions_concerns: Vec<QuestionConcern>,
    pub verified_purchase_ratio: f32,
    pub confidence: f32,
    pub analyzed_at: DateTime<Utc>,
}

impl ReviewInsights {
    /// Key an extractor payload to its product.
    pub fn from_payload(
        fingerprint: Fingerprint,
        product_url: impl Into<String>,
        payload: ReviewInsightsPayload,
    ) -> Self {
        Self {
            fingerprint,
            product_url: product_url.into(),
            overall_sentiment: payload.overall_sentiment,
            total_reviews_analyzed: payload.total_reviews_analyzed,
            rating_distribution: payload.rating_distribution,
            common_complaints: payload.common_complaints,
            health_concerns: payload.health_concerns,
            positive_feedback: payload.positive_feedback,
            questions_concerns: payload.questions_concerns,
            verified_purchase_ratio: clamp_unit(payload.verified_purchase_ratio),
            confidence: clamp_unit(payload.confidence),
            analyzed_at: Utc::now(),
        }
    }
}

/// Review insights as held by the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReviews {
    pub fingerprint: Fingerprint,
    pub insights: ReviewInsights,
    pub stored_at: DateTime<Utc>,
}

impl StoredReviews {
    pub fn new(insights: ReviewInsights) -> Self {
        Self {
            fingerprint: insights.fingerprint.clone(),
            insights,
            stored_at: Utc::now(),
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parses_model_output() {
        let json = r#"{
            "overall_sentiment": "Mixed",
            "total_reviews_analyzed": 42,
            "rating_distribution": {"5_star": 20, "4_star": 10, "1_star": 12},
            "health_concerns": [
                {"concern": "skin rash", "frequency": "occasional", "severity": "moderate",
                 "examples": ["broke out after one use"]}
            ],
            "questions_concerns": [{"question": "Is it fragrance free?", "category": "ingredients"}],
            "verified_purchase_ratio": 0.85,
            "confidence": 0.7
        }"#;
        let payload: ReviewInsightsPayload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.overall_sentiment, Sentiment::Mixed);
        assert_eq!(payload.rating_distribution.total(), 42);
        assert_eq!(payload.rating_distribution.three_star, 0);
        assert_eq!(payload.health_concerns[0].severity, Severity::Moderate);
        assert!(!payload.questions_concerns[0].answered);
    }

    #[test]
    fn test_missing_confidence_defaults_to_zero() {
        let payload: ReviewInsightsPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.confidence, 0.0);
        assert_eq!(payload.overall_sentiment, Sentiment::Unknown);
    }

    #[test]
    fn test_from_payload_clamps_ratios() {
        let payload = ReviewInsightsPayload {
            verified_purchase_ratio: 1.7,
            confidence: f32::NAN,
            ..Default::default()
        };
        let insights = ReviewInsights::from_payload(
            Fingerprint::of("https://example.com/p"),
            "https://example.com/p",
            payload,
        );
        assert_eq!(insights.verified_purchase_ratio, 1.0);
        assert_eq!(insights.confidence, 0.0);
    }
}

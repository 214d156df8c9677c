//! Scraped page content and the structured product extracted from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text sections pulled from a product page.
///
/// Created per request and consumed within the same pipeline run; never
/// persisted. `confidence` is a coarse signal of how much text was
/// extracted, not a probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedContent {
    pub url: String,
    pub retailer: String,

    /// Product sections (title through product information)
    pub product_section_text: String,

    /// Reviews and Q&A sections, empty unless requested
    #[serde(default)]
    pub review_section_text: String,

    pub confidence: f32,

    /// How the content was obtained (e.g. "http_sections", "failed")
    pub method: String,

    pub scraped_at: DateTime<Utc>,

    #[serde(default)]
    pub has_reviews: bool,

    #[serde(default)]
    pub error_message: Option<String>,
}

impl ScrapedContent {
    pub fn new(url: impl Into<String>, retailer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retailer: retailer.into(),
            product_section_text: String::new(),
            review_section_text: String::new(),
            confidence: 0.0,
            method: "unknown".to_string(),
            scraped_at: Utc::now(),
            has_reviews: false,
            error_message: None,
        }
    }

    /// A scrape that produced nothing usable.
    pub fn failed(
        url: impl Into<String>,
        retailer: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            method: "failed".to_string(),
            error_message: Some(error.into()),
            ..Self::new(url, retailer)
        }
    }

    pub fn with_product_text(mut self, text: impl Into<String>) -> Self {
        self.product_section_text = text.into();
        self
    }

    pub fn with_review_text(mut self, text: impl Into<String>) -> Self {
        self.review_section_text = text.into();
        self.has_reviews = !self.review_section_text.trim().is_empty();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Structured product data produced by an [`Extractor`](crate::traits::ai::Extractor).
///
/// Confidence below the configured threshold (0.3 by default) is treated
/// as an extraction failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedProduct {
    pub product_name: String,
    pub brand: String,
    pub category: String,
    pub ingredients: Vec<String>,
    pub materials: Vec<String>,
    pub features: Vec<String>,
    pub warnings: Vec<String>,
    pub description: String,
    pub confidence: f32,
}

impl ExtractedProduct {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            ..Default::default()
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_ingredients(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ingredients = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_materials(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.materials = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Ingredients followed by materials not already listed.
    pub fn components(&self) -> Vec<String> {
        let mut out = self.ingredients.clone();
        for material in &self.materials {
            if !out.iter().any(|i| i.eq_ignore_ascii_case(material)) {
                out.push(material.clone());
            }
        }
        out
    }

    /// Name/category pair used for the score's category multiplier.
    pub fn label(&self) -> ProductLabel {
        ProductLabel::new(&self.product_name, &self.category)
    }
}

/// What the scorer knows about the product beyond its detections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductLabel {
    pub name: String,
    pub category: String,
}

impl ProductLabel {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_scrape() {
        let s = ScrapedContent::failed("https://amazon.com/dp/1", "Amazon.com", "HTTP 503");
        assert!(s.is_failed());
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.method, "failed");
        assert!(!s.has_reviews);
    }

    #[test]
    fn test_components_dedupes_materials() {
        let p = ExtractedProduct::new("Pan")
            .with_ingredients(["water", "PTFE coating"])
            .with_materials(["ptfe coating", "aluminum"]);
        assert_eq!(p.components(), vec!["water", "PTFE coating", "aluminum"]);
    }

    #[test]
    fn test_extracted_product_defaults_missing_fields() {
        let p: ExtractedProduct =
            serde_json::from_str(r#"{"product_name":"Soap","confidence":0.8}"#).unwrap();
        assert_eq!(p.product_name, "Soap");
        assert!(p.ingredients.is_empty());
        assert!(p.brand.is_empty());
    }
}

//! LLM prompts for extraction and enrichment.
//!
//! Extraction prompts only parse what the page says; enrichment prompts
//! reason about harmful substances against the reference tables.

use crate::types::product::{ExtractedProduct, ScrapedContent};
use crate::types::reference::ReferenceTables;

/// Reference entries listed per table in enrichment prompts.
pub const REFERENCE_SAMPLE_SIZE: usize = 10;

/// System prompt for structured product extraction.
pub const EXTRACT_PRODUCT_PROMPT: &str = r#"You are a data extraction expert. Parse the text sections of a product page and extract structured product information.

Return ONLY a JSON object with this structure:
{
    "product_name": "string",
    "brand": "string",
    "category": "string (product type, e.g. cookware, shampoo, pesticide)",
    "ingredients": ["ingredient1", "ingredient2"],
    "materials": ["material1", "material2"],
    "features": ["feature1", "feature2"],
    "warnings": ["warning1", "warning2"],
    "description": "string",
    "confidence": 0.0-1.0
}

Guidelines:
- Ingredients: look for "Ingredients:", "Contains:", ingredient lists
- Materials: material composition and coatings (e.g. "PTFE coating", "100% cotton")
- Features: bullet points and key features
- Warnings: warning text, disclaimers, safety notices
- Confidence reflects how complete the extraction is (0.0 = no data, 1.0 = complete)
- Use "" or [] for fields that are not present"#;

/// System prompt for review and Q&A insight extraction.
pub const EXTRACT_REVIEWS_PROMPT: &str = r#"You are a consumer review analyst. Parse the review and Q&A sections of a product page and extract consumer insights, focusing on health-related complaints.

Return ONLY a JSON object with this structure:
{
    "overall_sentiment": "positive|mixed|negative",
    "total_reviews_analyzed": number,
    "rating_distribution": {"5_star": n, "4_star": n, "3_star": n, "2_star": n, "1_star": n},
    "common_complaints": [
        {"complaint": "string", "frequency": "rare|occasional|common|frequent", "severity": "low|moderate|high", "examples": ["quote"]}
    ],
    "health_concerns": [
        {"concern": "string (e.g. skin rash, allergic reaction)", "frequency": "rare|occasional|common|frequent", "severity": "low|moderate|high|severe", "examples": ["quote"]}
    ],
    "positive_feedback": [
        {"aspect": "string", "frequency": "rare|occasional|common|frequent"}
    ],
    "questions_concerns": [
        {"question": "string", "category": "safety|ingredients|usage|other", "answered": true}
    ],
    "verified_purchase_ratio": 0.0-1.0,
    "confidence": 0.0-1.0
}

Guidelines:
- Focus on rashes, irritation, allergic reactions, burns, sensitivities
- Quote reviews verbatim as examples
- Pay attention to 1-2 star reviews for safety issues
- Confidence reflects sample size and clarity"#;

/// System prompt header for harmful substance analysis.
pub const ENRICH_PROMPT: &str = r#"You are a product safety analyst. Identify allergens, PFAS compounds ("forever chemicals") and other toxins (heavy metals, carcinogens, endocrine disruptors) in a consumer product.

Return ONLY a JSON object with this structure:
{
    "product_name": "string",
    "brand": "string",
    "retailer": "string",
    "category": "string",
    "ingredients": ["ingredient1", "ingredient2"],
    "allergens_detected": [
        {"name": "string", "severity": "low|moderate|high|severe", "source": "where found", "confidence": 0.0-1.0}
    ],
    "pfas_detected": [
        {"name": "string", "cas_number": "string or null", "body_effects": "effects on the human body", "source": "where found", "confidence": 0.0-1.0}
    ],
    "other_concerns": [
        {"name": "string", "category": "heavy metal|carcinogen|endocrine disruptor|other", "severity": "low|moderate|high|severe", "description": "string", "confidence": 0.0-1.0}
    ],
    "confidence": 0.0-1.0,
    "summary": "one or two sentences"
}

Guidelines:
- Be conservative: report uncertain risks with lower confidence
- Check synonyms and alternate names
- If ingredients are not listed, report low overall confidence
- Common PFAS indicators: "non-stick", "water-resistant", "stain-resistant""#;

/// Build the user message for product extraction.
pub fn format_extract_product(content: &ScrapedContent) -> String {
    format!(
        "Extract product information from this page.\n\nURL: {}\nRetailer: {}\n\nContent:\n{}\n\nReturn the structured JSON object.",
        content.url, content.retailer, content.product_section_text
    )
}

/// Build the user message for review extraction.
pub fn format_extract_reviews(content: &ScrapedContent) -> String {
    format!(
        "Extract consumer insights from these reviews and Q&A.\n\nURL: {}\nRetailer: {}\n\nReviews & Q&A:\n{}\n\nReturn the structured JSON object.",
        content.url, content.retailer, content.review_section_text
    )
}

/// Build the system prompt for enrichment: instructions, reference sample
/// and the user's allergen profile.
pub fn format_enrich_system(refs: &ReferenceTables, allergen_profile: &[String]) -> String {
    let mut prompt = String::from(ENRICH_PROMPT);

    if !refs.allergens.is_empty() {
        prompt.push_str(&format!(
            "\n\nAllergen reference ({} entries):\n",
            refs.allergens.len()
        ));
        for allergen in refs.allergens.iter().take(REFERENCE_SAMPLE_SIZE) {
            prompt.push_str(&format!(
                "- {}: synonyms [{}]\n",
                allergen.name,
                allergen.synonyms.join(", ")
            ));
        }
    }

    if !refs.pfas.is_empty() {
        prompt.push_str(&format!("\nPFAS reference ({} entries):\n", refs.pfas.len()));
        for pfas in refs.pfas.iter().take(REFERENCE_SAMPLE_SIZE) {
            prompt.push_str(&format!(
                "- {} (CAS: {}): {}\n",
                pfas.name,
                pfas.cas_number.as_deref().unwrap_or("unknown"),
                pfas.body_effects.as_deref().unwrap_or("No description")
            ));
        }
    }

    if !allergen_profile.is_empty() {
        prompt.push_str(&format!(
            "\nUser's allergen profile - pay special attention to: {}\n",
            allergen_profile.join(", ")
        ));
    }

    prompt
}

/// User message for enrichment over already-extracted data.
pub fn format_enrich_product(product: &ExtractedProduct) -> String {
    let product_json = serde_json::to_string_pretty(product).unwrap_or_default();
    format!(
        "Analyze this already-extracted product for harmful substances. Do not fetch anything.\n\nProduct:\n{}",
        product_json
    )
}

/// User message for the combined fetch+analyze call.
pub fn format_enrich_page(url: &str, page_text: &str) -> String {
    format!(
        "Analyze this product for harmful substances. Extract name, brand and ingredients from the page text first.\n\nURL: {}\n\nPage text:\n{}",
        url, page_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::reference::{AllergenRef, PfasRef};

    #[test]
    fn test_enrich_system_lists_first_ten_refs() {
        let allergens = (0..15)
            .map(|i| AllergenRef::new(format!("allergen-{}", i)))
            .collect();
        let refs = ReferenceTables::new(
            allergens,
            vec![PfasRef::new("PFOA").with_cas_number("335-67-1")],
        );

        let prompt = format_enrich_system(&refs, &["peanut".to_string()]);
        assert!(prompt.contains("Allergen reference (15 entries)"));
        assert!(prompt.contains("allergen-9"));
        assert!(!prompt.contains("allergen-10"));
        assert!(prompt.contains("PFOA (CAS: 335-67-1): No description"));
        assert!(prompt.contains("pay special attention to: peanut"));
    }

    #[test]
    fn test_enrich_system_without_refs_or_profile() {
        let prompt = format_enrich_system(&ReferenceTables::default(), &[]);
        assert_eq!(prompt, ENRICH_PROMPT);
    }

    #[test]
    fn test_enrich_product_embeds_json() {
        let product = ExtractedProduct::new("Pan").with_ingredients(["PTFE"]);
        let message = format_enrich_product(&product);
        assert!(message.contains("\"product_name\": \"Pan\""));
        assert!(message.contains("PTFE"));
    }
}

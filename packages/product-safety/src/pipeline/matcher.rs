//! Deterministic ingredient matching against the reference tables.
//!
//! Pure functions, no I/O. Every reference entry whose name or any synonym
//! occurs (case-insensitively) inside an ingredient or material token
//! yields exactly one detection, in reference-table order.

use serde::{Deserialize, Serialize};

use crate::types::detection::{AllergenDetection, PfasDetection};
use crate::types::reference::{AllergenRef, PfasRef, ReferenceTables};

/// Detections found by reference matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub allergens: Vec<AllergenDetection>,
    pub pfas: Vec<PfasDetection>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.allergens.is_empty() && self.pfas.is_empty()
    }
}

/// Match ingredient and material tokens against both reference tables.
pub fn match_ingredients(
    ingredients: &[String],
    materials: &[String],
    allergen_refs: &[AllergenRef],
    pfas_refs: &[PfasRef],
) -> MatchResult {
    let tokens: Vec<String> = ingredients
        .iter()
        .chain(materials.iter())
        .map(|t| t.to_lowercase())
        .filter(|t| !t.trim().is_empty())
        .collect();

    if tokens.is_empty() {
        return MatchResult::default();
    }

    let allergens = allergen_refs
        .iter()
        .filter(|r| any_term_matches(r.terms(), &tokens))
        .map(|r| AllergenDetection::database_match(&r.name, r.severity.unwrap_or_default()))
        .collect();

    let pfas = pfas_refs
        .iter()
        .filter(|r| any_term_matches(r.terms(), &tokens))
        .map(|r| {
            let mut detection = PfasDetection::database_match(&r.name);
            if let Some(cas) = &r.cas_number {
                detection = detection.with_cas_number(cas);
            }
            if let Some(effects) = &r.body_effects {
                detection = detection.with_body_effects(effects);
            }
            detection
        })
        .collect();

    MatchResult { allergens, pfas }
}

/// Convenience wrapper over [`match_ingredients`] for a loaded table pair.
pub fn match_against(tables: &ReferenceTables, components: &[String]) -> MatchResult {
    match_ingredients(components, &[], &tables.allergens, &tables.pfas)
}

fn any_term_matches<'a>(terms: impl Iterator<Item = &'a str>, tokens: &[String]) -> bool {
    terms
        .map(|t| t.trim().to_lowercase())
        // an empty synonym would match every token
        .filter(|t| !t.is_empty())
        .any(|term| tokens.iter().any(|token| token.contains(&term)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::detection::{Severity, DATABASE_MATCH};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_concrete_example() {
        let result = match_ingredients(
            &strings(&["water", "PTFE coating", "fragrance"]),
            &[],
            &[AllergenRef::new("fragrance").with_synonyms(["parfum"])],
            &[PfasRef::new("PTFE")],
        );

        assert_eq!(result.allergens.len(), 1);
        assert_eq!(result.allergens[0].name, "fragrance");
        assert_eq!(result.allergens[0].confidence, 1.0);
        assert_eq!(result.allergens[0].source, DATABASE_MATCH);
        assert_eq!(result.allergens[0].severity, Severity::Low);

        assert_eq!(result.pfas.len(), 1);
        assert_eq!(result.pfas[0].name, "PTFE");
        assert_eq!(result.pfas[0].confidence, 1.0);
    }

    #[test]
    fn test_synonym_match_reports_canonical_name() {
        let result = match_ingredients(
            &strings(&["Aqua", "Parfum (Fragrance Blend)"]),
            &[],
            &[AllergenRef::new("fragrance").with_synonyms(["parfum"])],
            &[],
        );
        assert_eq!(result.allergens.len(), 1);
        assert_eq!(result.allergens[0].name, "fragrance");
    }

    #[test]
    fn test_one_detection_per_reference_entry() {
        let result = match_ingredients(
            &strings(&["fragrance", "natural fragrance"]),
            &strings(&["parfum"]),
            &[AllergenRef::new("fragrance").with_synonyms(["parfum"])],
            &[],
        );
        assert_eq!(result.allergens.len(), 1);
    }

    #[test]
    fn test_materials_are_matched() {
        let result = match_ingredients(
            &[],
            &strings(&["Teflon nonstick coating"]),
            &[],
            &[PfasRef::new("PTFE")
                .with_synonyms(["teflon"])
                .with_cas_number("9002-84-0")
                .with_body_effects("thyroid disease")],
        );
        assert_eq!(result.pfas.len(), 1);
        assert_eq!(result.pfas[0].cas_number.as_deref(), Some("9002-84-0"));
        assert_eq!(result.pfas[0].body_effects, "thyroid disease");
    }

    #[test]
    fn test_reference_severity_is_used() {
        let result = match_ingredients(
            &strings(&["peanut oil"]),
            &[],
            &[AllergenRef::new("peanut").with_severity(Severity::Severe)],
            &[],
        );
        assert_eq!(result.allergens[0].severity, Severity::Severe);
    }

    #[test]
    fn test_empty_inputs_yield_empty_result() {
        assert!(match_ingredients(&[], &[], &[], &[]).is_empty());
        assert!(match_ingredients(
            &strings(&["water"]),
            &[],
            &[],
            &[]
        )
        .is_empty());
        assert!(match_ingredients(&[], &[], &[AllergenRef::new("fragrance")], &[]).is_empty());
    }

    #[test]
    fn test_empty_synonym_never_matches() {
        let result = match_ingredients(
            &strings(&["water"]),
            &[],
            &[AllergenRef::new("latex").with_synonyms(["", "  "])],
            &[],
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_output_follows_reference_order() {
        let result = match_ingredients(
            &strings(&["soy lecithin", "milk powder"]),
            &[],
            &[AllergenRef::new("milk"), AllergenRef::new("soy")],
            &[],
        );
        let names: Vec<_> = result.allergens.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["milk", "soy"]);
    }
}

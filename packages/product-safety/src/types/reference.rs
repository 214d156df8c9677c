//! Reference tables of known allergens and PFAS compounds.

use serde::{Deserialize, Serialize};

use super::detection::Severity;

/// A known allergen with its alternate names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergenRef {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Severity reported for matches; `Low` when not configured
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl AllergenRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            synonyms: Vec::new(),
            severity: None,
        }
    }

    pub fn with_synonyms(mut self, synonyms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Canonical name followed by every synonym.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// A known PFAS compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PfasRef {
    pub name: String,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub body_effects: Option<String>,
}

impl PfasRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cas_number: None,
            synonyms: Vec::new(),
            body_effects: None,
        }
    }

    pub fn with_cas_number(mut self, cas: impl Into<String>) -> Self {
        self.cas_number = Some(cas.into());
        self
    }

    pub fn with_synonyms(mut self, synonyms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_body_effects(mut self, effects: impl Into<String>) -> Self {
        self.body_effects = Some(effects.into());
        self
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// Both reference tables, loaded once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    pub allergens: Vec<AllergenRef>,
    pub pfas: Vec<PfasRef>,
}

impl ReferenceTables {
    pub fn new(allergens: Vec<AllergenRef>, pfas: Vec<PfasRef>) -> Self {
        Self { allergens, pfas }
    }

    pub fn is_empty(&self) -> bool {
        self.allergens.is_empty() && self.pfas.is_empty()
    }

    /// Whether `name` is a known allergen name or synonym.
    pub fn knows_allergen(&self, name: &str) -> bool {
        self.allergens
            .iter()
            .any(|r| r.terms().any(|t| t.trim().eq_ignore_ascii_case(name.trim())))
    }

    /// Whether `name` is a known PFAS name, synonym, or CAS number.
    pub fn knows_pfas(&self, name: &str) -> bool {
        self.pfas.iter().any(|r| {
            r.terms().any(|t| t.trim().eq_ignore_ascii_case(name.trim()))
                || r.cas_number.as_deref() == Some(name.trim())
        })
    }
}

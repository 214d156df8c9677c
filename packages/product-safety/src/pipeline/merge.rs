//! Merge deterministic matches with AI-enriched detections.
//!
//! AI detections are the primary record. A database match is appended
//! only when no AI detection already carries its canonical name, so
//! matches are never double counted and never silently dropped.

use std::collections::HashSet;

use crate::types::detection::{DetectionSet, Substance};

/// Combine one category of detections.
///
/// Output order: AI detections as given, then the database matches whose
/// canonical name is new, in their original order. Duplicate database
/// names are collapsed to the first occurrence.
pub fn merge_detections<T>(ai: &[T], db: &[T]) -> Vec<T>
where
    T: Substance + Clone,
{
    let mut seen: HashSet<String> = ai.iter().map(Substance::canonical_key).collect();
    let mut merged = ai.to_vec();

    for detection in db {
        if seen.insert(detection.canonical_key()) {
            merged.push(detection.clone());
        }
    }

    merged
}

/// Merge a full set of database matches with an AI-enriched set.
pub fn merge(db: &DetectionSet, ai: &DetectionSet) -> DetectionSet {
    DetectionSet {
        allergens: merge_detections(&ai.allergens, &db.allergens),
        pfas: merge_detections(&ai.pfas, &db.pfas),
        other_concerns: merge_detections(&ai.other_concerns, &db.other_concerns),
    }
}

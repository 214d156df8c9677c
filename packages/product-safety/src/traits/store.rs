//! Knowledge store trait: cached analyses, review insights, reference tables.
//!
//! The store is an external, independently synchronized service. The
//! pipeline never locks or transacts across calls; concurrent writers for
//! the same fingerprint are last-write-wins.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::{
    analysis::{Fingerprint, StoredAnalysis},
    reference::{AllergenRef, PfasRef, ReferenceTables},
    reviews::{ReviewInsights, StoredReviews},
};

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Whether the store can serve requests right now.
    ///
    /// When false the pipeline skips the cache and persistence steps.
    async fn is_available(&self) -> bool;

    /// Get a cached analysis by fingerprint.
    async fn get_cached(&self, fingerprint: &Fingerprint) -> StoreResult<Option<StoredAnalysis>>;

    /// Store (or replace) the analysis for a fingerprint.
    ///
    /// Takes the record by value: the pipeline keeps no handle to it.
    async fn store(
        &self,
        fingerprint: &Fingerprint,
        url: &str,
        record: StoredAnalysis,
    ) -> StoreResult<()>;

    async fn get_allergen_refs(&self) -> StoreResult<Vec<AllergenRef>>;

    async fn get_pfas_refs(&self) -> StoreResult<Vec<PfasRef>>;

    async fn get_cached_reviews(
        &self,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<StoredReviews>>;

    async fn store_reviews(
        &self,
        fingerprint: &Fingerprint,
        insights: ReviewInsights,
    ) -> StoreResult<()>;

    /// Record that a URL was searched. Best-effort.
    async fn log_search(&self, _url: &str) -> StoreResult<()> {
        Ok(())
    }

    /// Load both reference tables.
    async fn reference_tables(&self) -> StoreResult<ReferenceTables> {
        let allergens = self.get_allergen_refs().await?;
        let pfas = self.get_pfas_refs().await?;
        Ok(ReferenceTables::new(allergens, pfas))
    }
}

#[async_trait]
impl<T: KnowledgeStore + ?Sized> KnowledgeStore for Arc<T> {
    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }

    async fn get_cached(&self, fingerprint: &Fingerprint) -> StoreResult<Option<StoredAnalysis>> {
        (**self).get_cached(fingerprint).await
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        url: &str,
        record: StoredAnalysis,
    ) -> StoreResult<()> {
        (**self).store(fingerprint, url, record).await
    }

    async fn get_allergen_refs(&self) -> StoreResult<Vec<AllergenRef>> {
        (**self).get_allergen_refs().await
    }

    async fn get_pfas_refs(&self) -> StoreResult<Vec<PfasRef>> {
        (**self).get_pfas_refs().await
    }

    async fn get_cached_reviews(
        &self,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<StoredReviews>> {
        (**self).get_cached_reviews(fingerprint).await
    }

    async fn store_reviews(
        &self,
        fingerprint: &Fingerprint,
        insights: ReviewInsights,
    ) -> StoreResult<()> {
        (**self).store_reviews(fingerprint, insights).await
    }

    async fn log_search(&self, url: &str) -> StoreResult<()> {
        (**self).log_search(url).await
    }
}

//! In-memory knowledge store for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::KnowledgeStore;
use crate::types::{
    analysis::{Fingerprint, StoredAnalysis},
    reference::{AllergenRef, PfasRef},
    reviews::{ReviewInsights, StoredReviews},
};

/// In-memory storage for analyses, review insights and reference tables.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart. Availability and failures can be toggled
/// at runtime to exercise the pipeline's degrade paths.
pub struct MemoryStore {
    analyses: RwLock<HashMap<Fingerprint, StoredAnalysis>>,
    reviews: RwLock<HashMap<Fingerprint, StoredReviews>>,
    allergens: RwLock<Vec<AllergenRef>>,
    pfas: RwLock<Vec<PfasRef>>,
    searches: RwLock<Vec<String>>,
    available: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty, available store.
    pub fn new() -> Self {
        Self {
            analyses: RwLock::new(HashMap::new()),
            reviews: RwLock::new(HashMap::new()),
            allergens: RwLock::new(Vec::new()),
            pfas: RwLock::new(Vec::new()),
            searches: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seed the allergen reference table.
    pub fn with_allergen_refs(self, refs: Vec<AllergenRef>) -> Self {
        if let Ok(mut table) = self.allergens.write() {
            *table = refs;
        }
        self
    }

    /// Seed the PFAS reference table.
    pub fn with_pfas_refs(self, refs: Vec<PfasRef>) -> Self {
        if let Ok(mut table) = self.pfas.write() {
            *table = refs;
        }
        self
    }

    /// Insert a cached analysis directly, bypassing failure injection.
    pub fn insert_analysis(&self, record: StoredAnalysis) -> StoreResult<()> {
        write(&self.analyses)?.insert(record.url_hash.clone(), record);
        Ok(())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every read (cache lookups and reference tables) fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn review_count(&self) -> usize {
        self.reviews.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Number of successful writes (analyses and reviews).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// URLs passed to `log_search`, oldest first.
    pub fn searches(&self) -> Vec<String> {
        self.searches.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Clear all stored analyses, reviews and searches.
    pub fn clear(&self) {
        if let Ok(mut m) = self.analyses.write() {
            m.clear();
        }
        if let Ok(mut m) = self.reviews.write() {
            m.clear();
        }
        if let Ok(mut s) = self.searches.write() {
            s.clear();
        }
    }

    fn check_read(&self) -> StoreResult<()> {
        self.check_available()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> StoreResult<()> {
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        Ok(())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get_cached(&self, fingerprint: &Fingerprint) -> StoreResult<Option<StoredAnalysis>> {
        self.check_read()?;
        Ok(read(&self.analyses)?.get(fingerprint).cloned())
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        _url: &str,
        record: StoredAnalysis,
    ) -> StoreResult<()> {
        self.check_write()?;
        write(&self.analyses)?.insert(fingerprint.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_allergen_refs(&self) -> StoreResult<Vec<AllergenRef>> {
        self.check_read()?;
        Ok(read(&self.allergens)?.clone())
    }

    async fn get_pfas_refs(&self) -> StoreResult<Vec<PfasRef>> {
        self.check_read()?;
        Ok(read(&self.pfas)?.clone())
    }

    async fn get_cached_reviews(
        &self,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<StoredReviews>> {
        self.check_read()?;
        Ok(read(&self.reviews)?.get(fingerprint).cloned())
    }

    async fn store_reviews(
        &self,
        fingerprint: &Fingerprint,
        insights: ReviewInsights,
    ) -> StoreResult<()> {
        self.check_write()?;
        write(&self.reviews)?.insert(fingerprint.clone(), StoredReviews::new(insights));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn log_search(&self, url: &str) -> StoreResult<()> {
        self.check_write()?;
        write(&self.searches)?.push(url.to_string());
        Ok(())
    }
}

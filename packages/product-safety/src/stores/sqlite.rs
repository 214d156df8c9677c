//! SQLite knowledge store.
//!
//! A file-based backend using SQLite. Good for:
//! - Local development
//! - Single-server deployments
//! - Testing with persistent data
//!
//! Detection arrays and raw payloads are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::KnowledgeStore;
use crate::types::{
    analysis::{Fingerprint, StoredAnalysis},
    detection::Severity,
    reference::{AllergenRef, PfasRef},
    reviews::{ReviewInsights, StoredReviews},
};

/// SQLite-backed knowledge store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./product-safety.db?mode=rwc` - File-based, created if missing
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        Self::connect(database_url, 5).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Uses a single connection: every `:memory:` connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS product_analyses (
                product_url_hash TEXT PRIMARY KEY,
                product_url TEXT NOT NULL,
                product_name TEXT NOT NULL,
                brand TEXT NOT NULL,
                category TEXT NOT NULL,
                harm_score INTEGER NOT NULL,
                allergens TEXT NOT NULL DEFAULT '[]',
                pfas_compounds TEXT NOT NULL DEFAULT '[]',
                other_concerns TEXT NOT NULL DEFAULT '[]',
                raw_analysis TEXT NOT NULL DEFAULT '{}',
                analyzed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS review_insights (
                product_url_hash TEXT PRIMARY KEY,
                insights TEXT NOT NULL,
                stored_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS allergens (
                name TEXT PRIMARY KEY,
                synonyms TEXT NOT NULL DEFAULT '[]',
                severity TEXT
            );

            CREATE TABLE IF NOT EXISTS pfas_compounds (
                name TEXT PRIMARY KEY,
                cas_number TEXT,
                synonyms TEXT NOT NULL DEFAULT '[]',
                body_effects TEXT
            );

            CREATE TABLE IF NOT EXISTS user_searches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_url TEXT NOT NULL,
                searched_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace an allergen reference entry.
    pub async fn upsert_allergen(&self, allergen: &AllergenRef) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO allergens (name, synonyms, severity) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET synonyms = excluded.synonyms, severity = excluded.severity
            "#,
        )
        .bind(&allergen.name)
        .bind(serde_json::to_string(&allergen.synonyms)?)
        .bind(allergen.severity.map(|s| s.as_str()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    /// Insert or replace a PFAS reference entry.
    pub async fn upsert_pfas(&self, pfas: &PfasRef) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pfas_compounds (name, cas_number, synonyms, body_effects) VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                cas_number = excluded.cas_number,
                synonyms = excluded.synonyms,
                body_effects = excluded.body_effects
            "#,
        )
        .bind(&pfas.name)
        .bind(&pfas.cas_number)
        .bind(serde_json::to_string(&pfas.synonyms)?)
        .bind(&pfas.body_effects)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    /// Number of logged searches.
    pub async fn search_count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_searches")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count)
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

fn parse_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {:?}: {}", value, e).into()))
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct AnalysisRow {
    product_url_hash: String,
    product_url: String,
    product_name: String,
    brand: String,
    category: String,
    harm_score: i64,
    allergens: String,
    pfas_compounds: String,
    other_concerns: String,
    raw_analysis: String,
    analyzed_at: String,
}

impl AnalysisRow {
    fn into_stored(self) -> StoreResult<StoredAnalysis> {
        Ok(StoredAnalysis {
            url_hash: Fingerprint::from_hex(self.product_url_hash),
            product_url: self.product_url,
            product_name: self.product_name,
            brand: self.brand,
            category: self.category,
            harm_score: self.harm_score.clamp(0, 100) as u8,
            allergens: serde_json::from_str(&self.allergens)?,
            pfas_compounds: serde_json::from_str(&self.pfas_compounds)?,
            other_concerns: serde_json::from_str(&self.other_concerns)?,
            raw_analysis: serde_json::from_str(&self.raw_analysis)?,
            analyzed_at: parse_time(&self.analyzed_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct AllergenRow {
    name: String,
    synonyms: String,
    severity: Option<String>,
}

#[derive(Debug, FromRow)]
struct PfasRow {
    name: String,
    cas_number: Option<String>,
    synonyms: String,
    body_effects: Option<String>,
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    product_url_hash: String,
    insights: String,
    stored_at: String,
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn get_cached(&self, fingerprint: &Fingerprint) -> StoreResult<Option<StoredAnalysis>> {
        let row: Option<AnalysisRow> =
            sqlx::query_as("SELECT * FROM product_analyses WHERE product_url_hash = ?")
                .bind(fingerprint.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(AnalysisRow::into_stored).transpose()
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        url: &str,
        record: StoredAnalysis,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_analyses (
                product_url_hash, product_url, product_name, brand, category, harm_score,
                allergens, pfas_compounds, other_concerns, raw_analysis, analyzed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_url_hash) DO UPDATE SET
                product_url = excluded.product_url,
                product_name = excluded.product_name,
                brand = excluded.brand,
                category = excluded.category,
                harm_score = excluded.harm_score,
                allergens = excluded.allergens,
                pfas_compounds = excluded.pfas_compounds,
                other_concerns = excluded.other_concerns,
                raw_analysis = excluded.raw_analysis,
                analyzed_at = excluded.analyzed_at
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(url)
        .bind(&record.product_name)
        .bind(&record.brand)
        .bind(&record.category)
        .bind(record.harm_score as i64)
        .bind(serde_json::to_string(&record.allergens)?)
        .bind(serde_json::to_string(&record.pfas_compounds)?)
        .bind(serde_json::to_string(&record.other_concerns)?)
        .bind(serde_json::to_string(&record.raw_analysis)?)
        .bind(record.analyzed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get_allergen_refs(&self) -> StoreResult<Vec<AllergenRef>> {
        let rows: Vec<AllergenRow> =
            sqlx::query_as("SELECT name, synonyms, severity FROM allergens ORDER BY rowid")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(AllergenRef {
                    name: row.name,
                    synonyms: serde_json::from_str(&row.synonyms)?,
                    severity: row.severity.as_deref().map(Severity::parse_lenient),
                })
            })
            .collect()
    }

    async fn get_pfas_refs(&self) -> StoreResult<Vec<PfasRef>> {
        let rows: Vec<PfasRow> = sqlx::query_as(
            "SELECT name, cas_number, synonyms, body_effects FROM pfas_compounds ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(PfasRef {
                    name: row.name,
                    cas_number: row.cas_number,
                    synonyms: serde_json::from_str(&row.synonyms)?,
                    body_effects: row.body_effects,
                })
            })
            .collect()
    }

    async fn get_cached_reviews(
        &self,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<StoredReviews>> {
        let row: Option<ReviewRow> = sqlx::query_as(
            "SELECT product_url_hash, insights, stored_at FROM review_insights WHERE product_url_hash = ?",
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|row| {
            Ok(StoredReviews {
                fingerprint: Fingerprint::from_hex(row.product_url_hash),
                insights: serde_json::from_str(&row.insights)?,
                stored_at: parse_time(&row.stored_at)?,
            })
        })
        .transpose()
    }

    async fn store_reviews(
        &self,
        fingerprint: &Fingerprint,
        insights: ReviewInsights,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO review_insights (product_url_hash, insights, stored_at) VALUES (?, ?, ?)
            ON CONFLICT(product_url_hash) DO UPDATE SET
                insights = excluded.insights,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(serde_json::to_string(&insights)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn log_search(&self, url: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO user_searches (product_url, searched_at) VALUES (?, ?)")
            .bind(url)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

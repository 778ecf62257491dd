//! Reference Data Store: read-only access to occupations, titles, skills and
//! detailed activities with their precomputed exposure scores.
//!
//! The pipeline only ever sees `Arc<dyn ReferenceStore>`. Two backends:
//! - `PgReferenceStore`: Postgres via sqlx (production)
//! - `InMemoryReferenceStore`: JSON catalogue file (local runs, tests)
//!
//! The core never writes through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DetailedActivity, OccupationProfile};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryReferenceStore;
pub use postgres::PgReferenceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid reference row: {0}")]
    InvalidRow(String),

    #[error("Failed to load reference catalogue: {0}")]
    Load(String),
}

/// An occupation whose canonical or alternate title contained at least one search token.
#[derive(Debug, Clone)]
pub struct TitleHit {
    pub occupation: OccupationProfile,
    pub title: String,
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Keyed lookup by occupation code.
    async fn occupation(&self, code: &str) -> Result<Option<OccupationProfile>, StoreError>;

    /// Case-insensitive exact match against canonical and alternate titles.
    /// Returned in catalogue (code) order.
    async fn occupations_by_exact_title(
        &self,
        title: &str,
    ) -> Result<Vec<OccupationProfile>, StoreError>;

    /// Substring search: every title containing at least one of `tokens`.
    /// One hit per matching title, most tokens contained first, then catalogue
    /// order. The limit applies after that ranking.
    async fn search_titles(
        &self,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<TitleHit>, StoreError>;

    /// Bounded catalogue sample. With an industry hint, occupations whose title or
    /// description mention it come first.
    async fn sample_occupations(
        &self,
        industry: Option<&str>,
        limit: usize,
    ) -> Result<Vec<OccupationProfile>, StoreError>;

    /// Activities linked to the occupation's task statements.
    async fn activities_for_occupation(
        &self,
        code: &str,
        limit: usize,
    ) -> Result<Vec<DetailedActivity>, StoreError>;

    /// Bounded catalogue-wide activity sample.
    async fn sample_activities(&self, limit: usize) -> Result<Vec<DetailedActivity>, StoreError>;

    /// Keyed lookup of activities. Unknown ids are simply absent from the map.
    async fn activities_by_id(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, DetailedActivity>, StoreError>;

    /// Occupations that may be recommended, excluding `exclude_code`. Ranked by
    /// how well `exclude_code`'s skills cover each one's requirements
    /// (`OccupationProfile::skill_coverage_by`), then code; the limit applies
    /// after that ranking. Code order only when `exclude_code` is unknown.
    async fn candidate_pool(
        &self,
        exclude_code: &str,
        limit: usize,
    ) -> Result<Vec<OccupationProfile>, StoreError>;
}

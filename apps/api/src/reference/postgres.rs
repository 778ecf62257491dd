use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::models::activity::DetailedActivityRow;
use crate::models::occupation::{
    OccupationRow, OccupationSkillRow, TitleHitRow, NON_TRIVIAL_SKILL_LEVEL,
};
use crate::models::{DetailedActivity, OccupationProfile};
use crate::reference::{ReferenceStore, StoreError, TitleHit};

/// Postgres-backed reference store.
///
/// Tables (populated by the offline import/batch-scoring job):
/// `occupations`, `occupation_titles`, `occupation_skills`,
/// `detailed_activities`, `occupation_activities`.
#[derive(Clone)]
pub struct PgReferenceStore {
    pool: PgPool,
}

impl PgReferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads skill vectors for `rows` in one query and assembles validated profiles.
    /// Rows that fail validation are skipped with a warning.
    async fn assemble(&self, rows: Vec<OccupationRow>) -> Result<Vec<OccupationProfile>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let codes: Vec<String> = rows.iter().map(|r| r.code.clone()).collect();
        let skill_rows = sqlx::query_as::<_, OccupationSkillRow>(
            "SELECT code, skill_id, level FROM occupation_skills WHERE code = ANY($1)",
        )
        .bind(&codes)
        .fetch_all(&self.pool)
        .await?;

        let mut skills: HashMap<String, BTreeMap<String, f64>> = HashMap::new();
        for row in skill_rows {
            skills
                .entry(row.code)
                .or_default()
                .insert(row.skill_id, row.level);
        }

        let mut profiles = Vec::with_capacity(rows.len());
        for row in rows {
            let vector = skills.remove(&row.code).unwrap_or_default();
            match row.into_profile(vector) {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!("Skipping occupation row: {e}"),
            }
        }
        Ok(profiles)
    }
}

fn into_activities(rows: Vec<DetailedActivityRow>) -> Vec<DetailedActivity> {
    rows.into_iter()
        .filter_map(|row| match DetailedActivity::try_from(row) {
            Ok(activity) => Some(activity),
            Err(e) => {
                warn!("Skipping activity row: {e}");
                None
            }
        })
        .collect()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn occupation(&self, code: &str) -> Result<Option<OccupationProfile>, StoreError> {
        let row = sqlx::query_as::<_, OccupationRow>(
            "SELECT code, title, description, preparation_tier FROM occupations WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn occupations_by_exact_title(
        &self,
        title: &str,
    ) -> Result<Vec<OccupationProfile>, StoreError> {
        let rows = sqlx::query_as::<_, OccupationRow>(
            r#"
            SELECT o.code, o.title, o.description, o.preparation_tier
            FROM occupations o
            WHERE LOWER(o.title) = LOWER($1)
               OR EXISTS (
                   SELECT 1 FROM occupation_titles t
                   WHERE t.code = o.code AND LOWER(t.title) = LOWER($1)
               )
            ORDER BY o.code
            "#,
        )
        .bind(title.trim())
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn search_titles(
        &self,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<TitleHit>, StoreError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let patterns: Vec<String> = tokens.iter().map(|t| format!("%{t}%")).collect();

        let hits = sqlx::query_as::<_, TitleHitRow>(
            r#"
            SELECT code, title FROM (
                SELECT t.code, t.title,
                       (SELECT COUNT(*) FROM unnest($1::text[]) AS p(pattern)
                        WHERE t.title ILIKE p.pattern) AS overlap
                FROM (
                    SELECT code, title FROM occupations
                    UNION
                    SELECT code, title FROM occupation_titles
                ) t
            ) scored
            WHERE overlap > 0
            ORDER BY overlap DESC, code, title
            LIMIT $2
            "#,
        )
        .bind(&patterns)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut codes: Vec<String> = hits.iter().map(|h| h.code.clone()).collect();
        codes.sort();
        codes.dedup();
        let rows = sqlx::query_as::<_, OccupationRow>(
            "SELECT code, title, description, preparation_tier FROM occupations WHERE code = ANY($1)",
        )
        .bind(&codes)
        .fetch_all(&self.pool)
        .await?;
        let profiles: HashMap<String, OccupationProfile> = self
            .assemble(rows)
            .await?
            .into_iter()
            .map(|p| (p.code.clone(), p))
            .collect();

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                profiles.get(&hit.code).map(|occupation| TitleHit {
                    occupation: occupation.clone(),
                    title: hit.title,
                })
            })
            .collect())
    }

    async fn sample_occupations(
        &self,
        industry: Option<&str>,
        limit: usize,
    ) -> Result<Vec<OccupationProfile>, StoreError> {
        let industry_pattern = industry
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));

        let rows = sqlx::query_as::<_, OccupationRow>(
            r#"
            SELECT code, title, description, preparation_tier
            FROM occupations
            ORDER BY
                CASE WHEN $1::text IS NOT NULL
                      AND (title ILIKE $1 OR description ILIKE $1) THEN 0 ELSE 1 END,
                code
            LIMIT $2
            "#,
        )
        .bind(industry_pattern)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn activities_for_occupation(
        &self,
        code: &str,
        limit: usize,
    ) -> Result<Vec<DetailedActivity>, StoreError> {
        let rows = sqlx::query_as::<_, DetailedActivityRow>(
            r#"
            SELECT DISTINCT a.id, a.title, a.exposure_score, a.confidence
            FROM detailed_activities a
            JOIN occupation_activities oa ON oa.activity_id = a.id
            WHERE oa.code = $1
            ORDER BY a.id
            LIMIT $2
            "#,
        )
        .bind(code)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(into_activities(rows))
    }

    async fn sample_activities(&self, limit: usize) -> Result<Vec<DetailedActivity>, StoreError> {
        let rows = sqlx::query_as::<_, DetailedActivityRow>(
            "SELECT id, title, exposure_score, confidence FROM detailed_activities ORDER BY id LIMIT $1",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(into_activities(rows))
    }

    async fn activities_by_id(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, DetailedActivity>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, DetailedActivityRow>(
            "SELECT id, title, exposure_score, confidence FROM detailed_activities WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(into_activities(rows)
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect())
    }

    async fn candidate_pool(
        &self,
        exclude_code: &str,
        limit: usize,
    ) -> Result<Vec<OccupationProfile>, StoreError> {
        let rows = sqlx::query_as::<_, OccupationRow>(
            r#"
            SELECT o.code, o.title, o.description, o.preparation_tier
            FROM occupations o
            LEFT JOIN (
                SELECT need.code,
                       SUM(need.level * LEAST(COALESCE(have.level, 0) / need.level, 1.0))
                           / SUM(need.level) AS coverage
                FROM occupation_skills need
                LEFT JOIN occupation_skills have
                       ON have.code = $1 AND have.skill_id = need.skill_id
                WHERE need.level >= $3
                GROUP BY need.code
            ) m ON m.code = o.code
            WHERE o.code <> $1
            ORDER BY COALESCE(m.coverage, 0) DESC, o.code
            LIMIT $2
            "#,
        )
        .bind(exclude_code)
        .bind(sql_limit(limit))
        .bind(NON_TRIVIAL_SKILL_LEVEL)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }
}

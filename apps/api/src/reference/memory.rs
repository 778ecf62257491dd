use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{DetailedActivity, OccupationProfile};
use crate::reference::{ReferenceStore, StoreError, TitleHit};

/// One occupation in a catalogue file, with its titles and linked activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogOccupation {
    #[serde(flatten)]
    pub profile: OccupationProfile,
    #[serde(default)]
    pub alternate_titles: Vec<String>,
    #[serde(default)]
    pub activity_ids: Vec<String>,
}

/// On-disk shape of the reference catalogue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceCatalog {
    pub occupations: Vec<CatalogOccupation>,
    pub activities: Vec<DetailedActivity>,
}

/// Reference store held entirely in memory. Occupations are kept sorted by code,
/// which is the catalogue order every query reports in.
#[derive(Debug, Clone)]
pub struct InMemoryReferenceStore {
    occupations: Vec<CatalogOccupation>,
    activities: Vec<DetailedActivity>,
    activity_index: HashMap<String, usize>,
}

impl InMemoryReferenceStore {
    /// Validates the catalogue and builds the lookup indexes.
    pub fn new(catalog: ReferenceCatalog) -> Result<Self, StoreError> {
        let ReferenceCatalog {
            mut occupations,
            mut activities,
        } = catalog;

        let mut seen = HashSet::new();
        for occupation in &occupations {
            occupation.profile.validate()?;
            if !seen.insert(occupation.profile.code.clone()) {
                return Err(StoreError::InvalidRow(format!(
                    "duplicate occupation code {}",
                    occupation.profile.code
                )));
            }
        }

        activities.sort_by(|a, b| a.id.cmp(&b.id));
        let mut activity_index = HashMap::with_capacity(activities.len());
        for (idx, activity) in activities.iter().enumerate() {
            activity.validate()?;
            if activity_index.insert(activity.id.clone(), idx).is_some() {
                return Err(StoreError::InvalidRow(format!(
                    "duplicate activity id {}",
                    activity.id
                )));
            }
        }

        occupations.sort_by(|a, b| a.profile.code.cmp(&b.profile.code));

        Ok(Self {
            occupations,
            activities,
            activity_index,
        })
    }

    /// Loads a JSON catalogue from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Load(format!("{}: {e}", path.display())))?;
        let catalog: ReferenceCatalog = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Load(format!("{}: {e}", path.display())))?;
        let store = Self::new(catalog)?;
        info!(
            "Loaded reference catalogue from {}: {} occupations, {} activities",
            path.display(),
            store.occupations.len(),
            store.activities.len()
        );
        Ok(store)
    }

    fn titles(occupation: &CatalogOccupation) -> impl Iterator<Item = &str> {
        std::iter::once(occupation.profile.title.as_str())
            .chain(occupation.alternate_titles.iter().map(String::as_str))
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn occupation(&self, code: &str) -> Result<Option<OccupationProfile>, StoreError> {
        Ok(self
            .occupations
            .iter()
            .find(|o| o.profile.code == code)
            .map(|o| o.profile.clone()))
    }

    async fn occupations_by_exact_title(
        &self,
        title: &str,
    ) -> Result<Vec<OccupationProfile>, StoreError> {
        let wanted = title.trim().to_lowercase();
        Ok(self
            .occupations
            .iter()
            .filter(|o| Self::titles(o).any(|t| t.to_lowercase() == wanted))
            .map(|o| o.profile.clone())
            .collect())
    }

    async fn search_titles(
        &self,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<TitleHit>, StoreError> {
        let tokens: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let mut scored: Vec<(usize, TitleHit)> = Vec::new();

        for occupation in &self.occupations {
            let mut titles: Vec<&str> = Self::titles(occupation).collect();
            titles.sort_unstable();
            titles.dedup();
            for title in titles {
                let lower = title.to_lowercase();
                let overlap = tokens.iter().filter(|t| lower.contains(t.as_str())).count();
                if overlap > 0 {
                    scored.push((
                        overlap,
                        TitleHit {
                            occupation: occupation.profile.clone(),
                            title: title.to_string(),
                        },
                    ));
                }
            }
        }

        // stable: equal overlap keeps catalogue order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, hit)| hit)
            .collect())
    }

    async fn sample_occupations(
        &self,
        industry: Option<&str>,
        limit: usize,
    ) -> Result<Vec<OccupationProfile>, StoreError> {
        let industry = industry
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mentions_industry = |o: &CatalogOccupation| match &industry {
            Some(needle) => {
                o.profile.title.to_lowercase().contains(needle.as_str())
                    || o.profile.description.to_lowercase().contains(needle.as_str())
            }
            None => false,
        };

        let (preferred, rest): (Vec<_>, Vec<_>) =
            self.occupations.iter().partition(|o| mentions_industry(o));

        Ok(preferred
            .into_iter()
            .chain(rest)
            .take(limit)
            .map(|o| o.profile.clone())
            .collect())
    }

    async fn activities_for_occupation(
        &self,
        code: &str,
        limit: usize,
    ) -> Result<Vec<DetailedActivity>, StoreError> {
        let Some(occupation) = self.occupations.iter().find(|o| o.profile.code == code) else {
            return Ok(Vec::new());
        };

        let mut ids: Vec<&String> = occupation.activity_ids.iter().collect();
        ids.sort();
        ids.dedup();

        Ok(ids
            .into_iter()
            .filter_map(|id| self.activity_index.get(id))
            .map(|&idx| self.activities[idx].clone())
            .take(limit)
            .collect())
    }

    async fn sample_activities(&self, limit: usize) -> Result<Vec<DetailedActivity>, StoreError> {
        Ok(self.activities.iter().take(limit).cloned().collect())
    }

    async fn activities_by_id(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, DetailedActivity>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.activity_index.get(id))
            .map(|&idx| {
                let activity = &self.activities[idx];
                (activity.id.clone(), activity.clone())
            })
            .collect())
    }

    async fn candidate_pool(
        &self,
        exclude_code: &str,
        limit: usize,
    ) -> Result<Vec<OccupationProfile>, StoreError> {
        let current = self
            .occupations
            .iter()
            .find(|o| o.profile.code == exclude_code)
            .map(|o| &o.profile);

        let mut scored: Vec<(f64, &OccupationProfile)> = self
            .occupations
            .iter()
            .filter(|o| o.profile.code != exclude_code)
            .map(|o| {
                let coverage = current.map_or(0.0, |c| o.profile.skill_coverage_by(c));
                (coverage, &o.profile)
            })
            .collect();

        // stable: equal coverage keeps code order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, profile)| profile.clone())
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Test fixtures
// ────────────────────────────────────────────────────────────────────────────

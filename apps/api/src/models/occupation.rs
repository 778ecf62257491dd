use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::reference::StoreError;

/// Lowest and highest preparation tier an occupation can carry.
pub const MIN_PREPARATION_TIER: u8 = 1;
pub const MAX_PREPARATION_TIER: u8 = 5;
/// Required levels below this do not count as skill requirements.
pub const NON_TRIVIAL_SKILL_LEVEL: f64 = 1.0;

/// Canonical occupation record. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupationProfile {
    pub code: String,
    pub title: String,
    pub description: String,
    /// 1 (little preparation) to 5 (extensive preparation).
    pub preparation_tier: u8,
    /// skill id → required proficiency level. BTreeMap keeps iteration order stable.
    #[serde(default)]
    pub skills: BTreeMap<String, f64>,
}

impl OccupationProfile {
    /// Level-weighted share (0–1) of this occupation's non-trivial skill
    /// requirements that `current`'s levels cover. 0 when it has none.
    pub fn skill_coverage_by(&self, current: &OccupationProfile) -> f64 {
        let (total_need, covered) = self
            .skills
            .iter()
            .filter(|(_, need)| **need >= NON_TRIVIAL_SKILL_LEVEL)
            .fold((0.0, 0.0), |(total_need, covered), (skill, &need)| {
                let have = current.skills.get(skill).copied().unwrap_or(0.0);
                (total_need + need, covered + need * (have / need).min(1.0))
            });

        if total_need > 0.0 {
            covered / total_need
        } else {
            0.0
        }
    }

    /// Checks the invariants every profile must hold before it enters the pipeline.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.code.trim().is_empty() {
            return Err(StoreError::InvalidRow(
                "occupation code cannot be empty".to_string(),
            ));
        }
        if !(MIN_PREPARATION_TIER..=MAX_PREPARATION_TIER).contains(&self.preparation_tier) {
            return Err(StoreError::InvalidRow(format!(
                "occupation {} has preparation tier {} (expected {}..={})",
                self.code, self.preparation_tier, MIN_PREPARATION_TIER, MAX_PREPARATION_TIER
            )));
        }
        if let Some((skill, level)) = self
            .skills
            .iter()
            .find(|(_, level)| !level.is_finite() || **level < 0.0)
        {
            return Err(StoreError::InvalidRow(format!(
                "occupation {} has invalid level {level} for skill {skill}",
                self.code
            )));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store row DTOs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
pub struct OccupationRow {
    pub code: String,
    pub title: String,
    pub description: String,
    pub preparation_tier: i16,
}

#[derive(Debug, Clone, FromRow)]
pub struct OccupationSkillRow {
    pub code: String,
    pub skill_id: String,
    pub level: f64,
}

/// A title (canonical or alternate) that matched a search, with its occupation code.
#[derive(Debug, Clone, FromRow)]
pub struct TitleHitRow {
    pub code: String,
    pub title: String,
}

impl OccupationRow {
    /// Attaches the skill vector and validates the assembled profile.
    pub fn into_profile(
        self,
        skills: BTreeMap<String, f64>,
    ) -> Result<OccupationProfile, StoreError> {
        let preparation_tier = u8::try_from(self.preparation_tier).map_err(|_| {
            StoreError::InvalidRow(format!(
                "occupation {} has preparation tier {}",
                self.code, self.preparation_tier
            ))
        })?;

        let profile = OccupationProfile {
            code: self.code,
            title: self.title,
            description: self.description,
            preparation_tier,
            skills,
        };
        profile.validate()?;
        Ok(profile)
    }
}

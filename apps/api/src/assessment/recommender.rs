//! Recommendation Ranker: shortlists lower-exposure occupations the person's
//! current skills transfer to.
//!
//! Pipeline per candidate: skill match (cheap, filters first) → exposure from the
//! candidate's own linked activities, or the preparation-tier heuristic when it
//! has none → risk filters → composite rank.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assessment::activity_mapper::{ActivityMapping, ActivityRef};
use crate::assessment::aggregator::{self, round1};
use crate::assessment::errors::AssessmentError;
use crate::models::occupation::NON_TRIVIAL_SKILL_LEVEL;
use crate::models::{OccupationProfile, UserTask};
use crate::reference::ReferenceStore;

pub const CANDIDATE_POOL_LIMIT: usize = 200;
const CANDIDATE_ACTIVITY_LIMIT: usize = 100;
const APPLICABLE_RATIO: f64 = 0.7;
const TO_LEARN_RATIO: f64 = 0.5;
const MAX_LISTED_SKILLS: usize = 5;
const REDUCTION_WEIGHT: f64 = 0.6;
const SKILL_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecommendationOptions {
    pub min_skill_match: f64,
    pub max_risk_score: f64,
    pub limit: usize,
}

impl Default for RecommendationOptions {
    fn default() -> Self {
        Self {
            min_skill_match: 30.0,
            max_risk_score: 100.0,
            limit: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    Activities,
    TierHeuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerCandidate {
    pub occupation: OccupationProfile,
    pub skill_match_percent: f64,
    pub candidate_risk: f64,
    pub risk_source: RiskSource,
    /// Current exposure minus candidate exposure. Always > 0.
    pub risk_reduction: f64,
    pub composite_rank: f64,
    pub applicable_skills: Vec<String>,
    pub skills_to_learn: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillMatch {
    pub percent: f64,
    pub applicable: Vec<String>,
    pub to_learn: Vec<String>,
}

/// Need-weighted coverage of the candidate's non-trivial skill requirements by
/// the current occupation's skill levels.
pub fn skill_match(current: &OccupationProfile, candidate: &OccupationProfile) -> SkillMatch {
    let mut applicable: Vec<(&str, f64)> = Vec::new();
    let mut to_learn: Vec<(&str, f64)> = Vec::new();

    for (skill, &need) in &candidate.skills {
        if need < NON_TRIVIAL_SKILL_LEVEL {
            continue;
        }
        let have = current.skills.get(skill).copied().unwrap_or(0.0);
        let ratio = (have / need).min(1.0);

        if ratio >= APPLICABLE_RATIO {
            applicable.push((skill.as_str(), need));
        } else if ratio < TO_LEARN_RATIO {
            to_learn.push((skill.as_str(), need));
        }
    }

    SkillMatch {
        percent: round1(candidate.skill_coverage_by(current) * 100.0),
        applicable: top_skills(applicable),
        to_learn: top_skills(to_learn),
    }
}

fn top_skills(mut skills: Vec<(&str, f64)>) -> Vec<String> {
    skills.sort_by(|a, b| b.1.total_cmp(&a.1));
    skills
        .into_iter()
        .take(MAX_LISTED_SKILLS)
        .map(|(skill, _)| skill.to_string())
        .collect()
}

/// Exposure estimate from preparation tier alone: more preparation, less exposure.
pub fn tier_heuristic_risk(tier: u8) -> f64 {
    match tier {
        0 | 1 => 70.0,
        2 => 60.0,
        3 => 50.0,
        4 => 40.0,
        _ => 30.0,
    }
}

pub fn composite_rank(risk_reduction: f64, skill_match_percent: f64) -> f64 {
    round1(REDUCTION_WEIGHT * risk_reduction + SKILL_WEIGHT * skill_match_percent)
}

/// Stable sort by composite rank, best first, then truncate.
pub fn rank(mut candidates: Vec<CareerCandidate>, limit: usize) -> Vec<CareerCandidate> {
    candidates.sort_by(|a, b| b.composite_rank.total_cmp(&a.composite_rank));
    candidates.truncate(limit);
    candidates
}

pub struct Recommender {
    store: Arc<dyn ReferenceStore>,
    concurrency: usize,
}

impl Recommender {
    pub fn new(store: Arc<dyn ReferenceStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Occupations that may be recommended instead of `current_code`: the ones
    /// whose skill requirements the current occupation covers best, at most
    /// `CANDIDATE_POOL_LIMIT` of them.
    pub async fn candidate_pool(
        &self,
        current_code: &str,
    ) -> Result<Vec<OccupationProfile>, AssessmentError> {
        Ok(self
            .store
            .candidate_pool(current_code, CANDIDATE_POOL_LIMIT)
            .await?)
    }

    pub async fn recommend(
        &self,
        current: &OccupationProfile,
        current_exposure: f64,
        pool: &[OccupationProfile],
        options: &RecommendationOptions,
    ) -> Result<Vec<CareerCandidate>, AssessmentError> {
        let transferable: Vec<(&OccupationProfile, SkillMatch)> = pool
            .iter()
            .filter(|candidate| candidate.code != current.code)
            .map(|candidate| (candidate, skill_match(current, candidate)))
            .filter(|(candidate, skills)| {
                let keep = skills.percent >= options.min_skill_match;
                if !keep {
                    debug!("{}: skill match {:.1} below minimum", candidate.code, skills.percent);
                }
                keep
            })
            .collect();

        let estimates: Vec<_> = transferable
            .iter()
            .map(|(candidate, _)| self.candidate_exposure(candidate))
            .collect();
        let estimated: Vec<Result<(f64, RiskSource), AssessmentError>> = stream::iter(estimates)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut candidates = Vec::new();
        for ((candidate, skills), estimate) in transferable.into_iter().zip(estimated) {
            let (candidate_risk, risk_source) = estimate?;
            if candidate_risk > options.max_risk_score || candidate_risk >= current_exposure {
                debug!("{}: exposure {candidate_risk:.1} filtered out", candidate.code);
                continue;
            }

            let risk_reduction = round1(current_exposure - candidate_risk);
            candidates.push(CareerCandidate {
                occupation: candidate.clone(),
                skill_match_percent: skills.percent,
                candidate_risk,
                risk_source,
                risk_reduction,
                composite_rank: composite_rank(risk_reduction, skills.percent),
                applicable_skills: skills.applicable,
                skills_to_learn: skills.to_learn,
            });
        }

        let ranked = rank(candidates, options.limit);
        info!(
            "Recommended {} occupation(s) from a pool of {} for {}",
            ranked.len(),
            pool.len(),
            current.code
        );
        Ok(ranked)
    }

    /// Aggregates the candidate's linked activities as equal-share tasks, each
    /// mapped with the activity's own scoring confidence.
    async fn candidate_exposure(
        &self,
        candidate: &OccupationProfile,
    ) -> Result<(f64, RiskSource), AssessmentError> {
        let activities = self
            .store
            .activities_for_occupation(&candidate.code, CANDIDATE_ACTIVITY_LIMIT)
            .await?;
        if activities.is_empty() {
            return Ok((
                tier_heuristic_risk(candidate.preparation_tier),
                RiskSource::TierHeuristic,
            ));
        }

        let tasks: Vec<UserTask> = activities
            .iter()
            .map(|a| UserTask::new(a.title.clone(), 1.0))
            .collect();
        let mappings: Vec<ActivityMapping> = activities
            .iter()
            .map(|a| {
                ActivityMapping::new(
                    vec![ActivityRef {
                        activity_id: a.id.clone(),
                        relevance: 1.0,
                    }],
                    a.confidence,
                )
            })
            .collect();
        let lookup: HashMap<_, _> = activities.into_iter().map(|a| (a.id.clone(), a)).collect();

        let exposure = aggregator::aggregate(&tasks, &mappings, &lookup)?;
        Ok((exposure.risk_score, RiskSource::Activities))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

//! Exposure Aggregator: pure, deterministic roll-up of mapped tasks into an
//! ExposureResult.
//!
//! Per task: unweighted mean of the mapped activities' exposure scores, pulled
//! toward the neutral 50 by the mapping confidence. Tasks with nothing usable
//! score exactly 50 ("medium") and count as fallback tasks at confidence 0.3. Everything else (risk score, breakdown,
//! scenarios, range) is a time-share-weighted roll-up of those task scores.
//!
//! Scores are rounded to one decimal only after every invariant holds on the
//! unrounded values; rounding is monotone so orderings survive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::assessment::activity_mapper::{ActivityMapping, ActivityRef, FALLBACK_CONFIDENCE};
use crate::assessment::errors::AssessmentError;
use crate::assessment::skill_tags::{self, TagCollector};
use crate::models::{DetailedActivity, UserTask};

pub const NEUTRAL_SCORE: f64 = 50.0;
const LOW_CEILING: f64 = 30.0;
const MEDIUM_CEILING: f64 = 60.0;
const RANGE_MARGIN: f64 = 5.0;
const SCENARIO_SHIFT: f64 = 10.0;
const LOW_CONFIDENCE: f64 = 0.5;
const TAG_ACTIVITY_TITLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureCategory {
    Low,
    Medium,
    High,
}

impl ExposureCategory {
    pub fn from_score(score: f64) -> Self {
        if score <= LOW_CEILING {
            Self::Low
        } else if score <= MEDIUM_CEILING {
            Self::Medium
        } else {
            Self::High
        }
    }

    fn slow_factor(self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.6,
            Self::Low => 0.3,
        }
    }

    fn rapid_factor(self) -> f64 {
        match self {
            Self::High => 1.2,
            Self::Medium => 1.1,
            Self::Low => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match ExposureCategory::from_score(score) {
            ExposureCategory::Low => Self::Low,
            ExposureCategory::Medium => Self::Moderate,
            ExposureCategory::High => Self::High,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioScores {
    pub slow: f64,
    pub rapid: f64,
}

/// Integer percentages of (normalized) work time per category. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExposure {
    pub description: String,
    /// Normalized share of work time, 0 – 100.
    pub time_share: f64,
    pub score: f64,
    pub category: ExposureCategory,
    pub mapping_confidence: f64,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureResult {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence_range: ConfidenceRange,
    pub scenario_scores: ScenarioScores,
    pub category_breakdown: CategoryBreakdown,
    pub task_scores: Vec<TaskExposure>,
    pub protected_skills: Vec<String>,
    pub vulnerable_skills: Vec<String>,
    pub average_mapping_confidence: f64,
    pub fallback_task_count: usize,
    /// Set when a deadline cut part of the assessment short.
    pub partial: bool,
    pub summary: String,
}

impl ExposureResult {
    pub fn mark_partial(&mut self) {
        if !self.partial {
            self.partial = true;
            self.summary
                .push_str(" The assessment hit its time limit, so part of it uses default estimates.");
        }
    }
}

/// Roll mapped tasks up into an exposure result.
///
/// `activity_lookup` only needs the activities referenced by `mappings`; ids
/// missing from it are ignored.
pub fn aggregate(
    tasks: &[UserTask],
    mappings: &[ActivityMapping],
    activity_lookup: &HashMap<String, DetailedActivity>,
) -> Result<ExposureResult, AssessmentError> {
    let weights = normalized_weights(tasks, mappings)?;

    let scored: Vec<ScoredTask> = tasks
        .iter()
        .zip(mappings)
        .zip(&weights)
        .map(|((task, mapping), &weight)| score_task(task, mapping, weight, activity_lookup))
        .collect();

    let risk: f64 = scored.iter().map(|t| t.weight * t.score).sum();
    let breakdown = category_breakdown(&scored);
    let scenarios = scenario_scores(&scored);

    let average_mapping_confidence =
        scored.iter().map(|t| t.confidence).sum::<f64>() / scored.len() as f64;
    let range = confidence_range(&scored, risk, average_mapping_confidence);

    let mut protected = TagCollector::default();
    let mut vulnerable = TagCollector::default();
    for task in &scored {
        match task.category {
            ExposureCategory::Low => protected.extend(skill_tags::protected_tags(&task.tag_text)),
            ExposureCategory::High => vulnerable.extend(skill_tags::vulnerable_tags(&task.tag_text)),
            ExposureCategory::Medium => {}
        }
    }

    let fallback_task_count = scored.iter().filter(|t| t.fallback).count();
    let risk_score = round1(risk);
    let risk_level = RiskLevel::from_score(risk_score);
    let confidence_range = ConfidenceRange {
        low: round1(range.0),
        high: round1(range.1),
    };

    let summary = summarize(
        risk_score,
        risk_level,
        confidence_range,
        average_mapping_confidence,
        fallback_task_count,
    );

    Ok(ExposureResult {
        risk_score,
        risk_level,
        confidence_range,
        scenario_scores: ScenarioScores {
            slow: round1(scenarios.0),
            rapid: round1(scenarios.1),
        },
        category_breakdown: breakdown,
        task_scores: scored
            .into_iter()
            .map(|t| TaskExposure {
                description: t.description,
                time_share: round1(t.weight * 100.0),
                score: round1(t.score),
                category: t.category,
                mapping_confidence: t.confidence,
                fallback: t.fallback,
            })
            .collect(),
        protected_skills: protected.into_vec(),
        vulnerable_skills: vulnerable.into_vec(),
        average_mapping_confidence: round2(average_mapping_confidence),
        fallback_task_count,
        partial: false,
        summary,
    })
}

/// Confidence-adjusted score: `raw·c + 50·(1−c)`.
pub fn adjust_for_confidence(raw: f64, confidence: f64) -> f64 {
    let c = confidence.clamp(0.0, 1.0);
    raw * c + NEUTRAL_SCORE * (1.0 - c)
}

struct ScoredTask {
    description: String,
    weight: f64,
    score: f64,
    category: ExposureCategory,
    confidence: f64,
    fallback: bool,
    tag_text: String,
}

/// Rejects task lists the aggregator cannot score. Returns the share total.
pub fn validate_tasks(tasks: &[UserTask]) -> Result<f64, AssessmentError> {
    if tasks.is_empty() {
        return Err(AssessmentError::EmptyOrInvalidTaskInput(
            "at least one task is required".to_string(),
        ));
    }
    if let Some(bad) = tasks
        .iter()
        .find(|t| !t.time_share.is_finite() || t.time_share < 0.0)
    {
        return Err(AssessmentError::EmptyOrInvalidTaskInput(format!(
            "time share for '{}' must be a non-negative number",
            bad.description
        )));
    }

    let total: f64 = tasks.iter().map(|t| t.time_share).sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(AssessmentError::EmptyOrInvalidTaskInput(
            "time shares must sum to more than zero".to_string(),
        ));
    }
    Ok(total)
}

/// Shares as fractions summing to 1.
fn normalized_weights(
    tasks: &[UserTask],
    mappings: &[ActivityMapping],
) -> Result<Vec<f64>, AssessmentError> {
    let total = validate_tasks(tasks)?;
    if tasks.len() != mappings.len() {
        return Err(AssessmentError::EmptyOrInvalidTaskInput(format!(
            "{} tasks but {} activity mappings",
            tasks.len(),
            mappings.len()
        )));
    }
    Ok(tasks.iter().map(|t| t.time_share / total).collect())
}

fn score_task(
    task: &UserTask,
    mapping: &ActivityMapping,
    weight: f64,
    lookup: &HashMap<String, DetailedActivity>,
) -> ScoredTask {
    let mut resolved: Vec<(&ActivityRef, &DetailedActivity)> = mapping
        .activities
        .iter()
        .filter_map(|r| lookup.get(&r.activity_id).map(|a| (r, a)))
        .collect();

    // nothing resolved: neutral score, never the model's own confidence
    let fallback = mapping.fallback || resolved.is_empty();
    let (score, confidence) = if fallback {
        (NEUTRAL_SCORE, FALLBACK_CONFIDENCE)
    } else {
        let confidence = mapping.mapping_confidence.clamp(0.0, 1.0);
        let raw = resolved.iter().map(|(_, a)| a.exposure_score).sum::<f64>()
            / resolved.len() as f64;
        (adjust_for_confidence(raw, confidence), confidence)
    };

    resolved.sort_by(|a, b| b.0.relevance.total_cmp(&a.0.relevance));
    let mut tag_text = task.description.clone();
    for (_, activity) in resolved.iter().take(TAG_ACTIVITY_TITLES) {
        tag_text.push('\n');
        tag_text.push_str(&activity.title);
    }

    ScoredTask {
        description: task.description.clone(),
        weight,
        score,
        category: ExposureCategory::from_score(score),
        confidence,
        fallback,
        tag_text,
    }
}

fn category_breakdown(tasks: &[ScoredTask]) -> CategoryBreakdown {
    let share_of = |category: ExposureCategory| -> f64 {
        tasks
            .iter()
            .filter(|t| t.category == category)
            .map(|t| t.weight * 100.0)
            .sum()
    };

    let mut parts = [
        share_of(ExposureCategory::Low).round() as i64,
        share_of(ExposureCategory::Medium).round() as i64,
        share_of(ExposureCategory::High).round() as i64,
    ];

    let drift = 100 - parts.iter().sum::<i64>();
    if drift != 0 {
        // first of the largest categories absorbs the rounding drift
        let mut largest = 0;
        for idx in 1..parts.len() {
            if parts[idx] > parts[largest] {
                largest = idx;
            }
        }
        parts[largest] += drift;
    }

    CategoryBreakdown {
        low: parts[0].max(0) as u32,
        medium: parts[1].max(0) as u32,
        high: parts[2].max(0) as u32,
    }
}

/// (slow, rapid)
fn scenario_scores(tasks: &[ScoredTask]) -> (f64, f64) {
    let slow: f64 = tasks
        .iter()
        .map(|t| t.weight * t.score * t.category.slow_factor())
        .sum();
    let rapid: f64 = tasks
        .iter()
        .map(|t| t.weight * (t.score * t.category.rapid_factor()).min(100.0))
        .sum();

    (
        (slow - SCENARIO_SHIFT).max(0.0),
        (rapid + SCENARIO_SHIFT).min(100.0),
    )
}

/// (low, high)
fn confidence_range(tasks: &[ScoredTask], risk: f64, average_confidence: f64) -> (f64, f64) {
    let variance: f64 = tasks
        .iter()
        .map(|t| t.weight * (t.score - risk).powi(2))
        .sum();
    let width = variance.sqrt() * (1.0 + (1.0 - average_confidence)) + RANGE_MARGIN;

    (
        (risk - width).clamp(0.0, 100.0),
        (risk + width).clamp(0.0, 100.0),
    )
}

fn summarize(
    risk_score: f64,
    level: RiskLevel,
    range: ConfidenceRange,
    average_confidence: f64,
    fallback_tasks: usize,
) -> String {
    let mut summary = format!(
        "Estimated AI exposure is {risk_score:.1}/100 ({} risk), likely between {:.1} and {:.1}.",
        level.label(),
        range.low,
        range.high
    );

    if fallback_tasks > 0 {
        summary.push_str(&format!(
            " Low confidence: {fallback_tasks} task(s) could not be matched to known work activities and were scored as neutral."
        ));
    } else if average_confidence < LOW_CONFIDENCE {
        summary.push_str(&format!(
            " Low confidence: average task mapping confidence is only {average_confidence:.2}."
        ));
    }

    summary
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::memory::fixtures::activity;

    fn lookup(activities: &[DetailedActivity]) -> HashMap<String, DetailedActivity> {
        activities.iter().map(|a| (a.id.clone(), a.clone())).collect()
    }

    fn mapped(ids: &[&str], confidence: f64) -> ActivityMapping {
        ActivityMapping::new(
            ids.iter()
                .map(|id| ActivityRef {
                    activity_id: id.to_string(),
                    relevance: 1.0,
                })
                .collect(),
            confidence,
        )
    }

    fn standard_lookup() -> HashMap<String, DetailedActivity> {
        lookup(&[
            activity("hi", "Enter data into billing systems", 90.0, 0.9),
            activity("eighty", "Compile routine reports", 80.0, 0.9),
            activity("twenty", "Counsel patients", 20.0, 0.9),
            activity("mid", "Coordinate projects", 45.0, 0.9),
        ])
    }

    #[test]
    fn test_single_high_exposure_task() {
        let tasks = vec![UserTask::new("Key invoices into the ledger", 100.0)];
        let result = aggregate(&tasks, &[mapped(&["hi"], 0.9)], &standard_lookup()).unwrap();

        assert_eq!(result.risk_score, 86.0);
        assert_eq!(result.task_scores[0].category, ExposureCategory::High);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(
            result.category_breakdown,
            CategoryBreakdown { low: 0, medium: 0, high: 100 }
        );
    }

    #[test]
    fn test_time_weighted_risk_and_breakdown() {
        let tasks = vec![
            UserTask::new("Write reports", 50.0),
            UserTask::new("Support patients", 50.0),
        ];
        let mappings = vec![mapped(&["eighty"], 1.0), mapped(&["twenty"], 1.0)];
        let result = aggregate(&tasks, &mappings, &standard_lookup()).unwrap();

        assert_eq!(result.risk_score, 50.0);
        assert_eq!(
            result.category_breakdown,
            CategoryBreakdown { low: 50, medium: 0, high: 50 }
        );
        // slow: 0.5·80·1.0 + 0.5·20·0.3 − 10; rapid: 0.5·96 + 0.5·20 + 10
        assert_eq!(result.scenario_scores.slow, 33.0);
        assert_eq!(result.scenario_scores.rapid, 68.0);
        // sd 30, full confidence, +5 margin
        assert_eq!(result.confidence_range, ConfidenceRange { low: 15.0, high: 85.0 });
    }

    #[test]
    fn test_empty_mapping_scores_neutral() {
        let tasks = vec![UserTask::new("Something unusual", 100.0)];
        let result = aggregate(&tasks, &[ActivityMapping::fallback()], &standard_lookup()).unwrap();

        assert_eq!(result.risk_score, 50.0);
        assert_eq!(result.task_scores[0].category, ExposureCategory::Medium);
        assert_eq!(result.fallback_task_count, 1);
        assert!(result.summary.contains("Low confidence"));
    }

    #[test]
    fn test_unknown_activity_ids_count_as_fallback() {
        let tasks = vec![UserTask::new("Mystery work", 100.0)];
        let result = aggregate(&tasks, &[mapped(&["nope"], 0.95)], &standard_lookup()).unwrap();

        assert_eq!(result.risk_score, 50.0);
        assert_eq!(result.fallback_task_count, 1);
        assert!(result.task_scores[0].fallback);
        assert_eq!(result.task_scores[0].mapping_confidence, FALLBACK_CONFIDENCE);
        assert_eq!(result.average_mapping_confidence, 0.3);
        assert!(result.summary.contains("Low confidence"));
    }

    #[test]
    fn test_lower_confidence_moves_toward_neutral() {
        let mut previous = f64::INFINITY;
        for confidence in [1.0, 0.8, 0.5, 0.2, 0.0] {
            let adjusted = adjust_for_confidence(90.0, confidence);
            assert!(adjusted < previous || confidence == 1.0);
            assert!(adjusted >= NEUTRAL_SCORE);
            previous = adjusted;
        }
        assert_eq!(adjust_for_confidence(10.0, 0.0), NEUTRAL_SCORE);
        assert!(adjust_for_confidence(10.0, 0.5) > adjust_for_confidence(10.0, 0.9));
    }

    #[test]
    fn test_shares_are_normalized() {
        let lookup = standard_lookup();
        let scaled = aggregate(
            &[UserTask::new("a", 2.0), UserTask::new("b", 6.0)],
            &[mapped(&["eighty"], 1.0), mapped(&["twenty"], 1.0)],
            &lookup,
        )
        .unwrap();
        let percent = aggregate(
            &[UserTask::new("a", 25.0), UserTask::new("b", 75.0)],
            &[mapped(&["eighty"], 1.0), mapped(&["twenty"], 1.0)],
            &lookup,
        )
        .unwrap();
        assert_eq!(scaled.risk_score, percent.risk_score);
        assert_eq!(scaled.risk_score, 35.0);
        assert_eq!(scaled.task_scores[1].time_share, 75.0);
    }

    #[test]
    fn test_breakdown_always_sums_to_100() {
        let lookup = standard_lookup();
        let task_sets: Vec<Vec<(f64, &str)>> = vec![
            vec![(1.0, "hi"), (1.0, "mid"), (1.0, "twenty")],
            vec![(33.3, "hi"), (33.3, "mid"), (33.4, "twenty")],
            vec![(1.0, "hi"), (1.0, "hi"), (1.0, "twenty"), (1.0, "mid"), (1.0, "mid"), (1.0, "mid")],
            vec![(12.5, "twenty"), (12.5, "mid"), (75.0, "hi")],
            vec![(0.0, "hi"), (10.0, "mid")],
        ];

        for set in task_sets {
            let tasks: Vec<_> = set.iter().map(|(s, _)| UserTask::new("task", *s)).collect();
            let mappings: Vec<_> = set.iter().map(|(_, id)| mapped(&[*id], 1.0)).collect();
            let result = aggregate(&tasks, &mappings, &lookup).unwrap();
            let b = result.category_breakdown;
            assert_eq!(b.low + b.medium + b.high, 100, "breakdown {b:?}");
        }
    }

    #[test]
    fn test_ordering_invariants_hold() {
        let lookup = standard_lookup();
        let cases: Vec<(Vec<&str>, f64)> = vec![
            (vec!["hi", "hi", "hi"], 1.0),
            (vec!["twenty", "twenty"], 1.0),
            (vec!["hi", "twenty", "mid"], 0.4),
            (vec!["mid"], 0.0),
        ];

        for (ids, confidence) in cases {
            let tasks: Vec<_> = ids.iter().map(|_| UserTask::new("task", 10.0)).collect();
            let mappings: Vec<_> = ids.iter().map(|id| mapped(&[*id], confidence)).collect();
            let result = aggregate(&tasks, &mappings, &lookup).unwrap();

            assert!(result.confidence_range.low <= result.risk_score);
            assert!(result.risk_score <= result.confidence_range.high);
            assert!(result.scenario_scores.rapid >= result.scenario_scores.slow);
        }
    }

    #[test]
    fn test_identical_inputs_identical_output() {
        let tasks = vec![
            UserTask::new("Schedule appointments", 40.0),
            UserTask::new("Counsel families", 60.0),
        ];
        let mappings = vec![mapped(&["hi", "eighty"], 0.8), mapped(&["twenty"], 0.7)];
        let first = aggregate(&tasks, &mappings, &standard_lookup()).unwrap();
        let second = aggregate(&tasks, &mappings, &standard_lookup()).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_skill_tags_follow_task_category() {
        let tasks = vec![
            UserTask::new("Schedule appointments and do data entry", 50.0),
            UserTask::new("Counsel grieving families and supervise volunteers", 50.0),
        ];
        let mappings = vec![mapped(&["hi"], 1.0), mapped(&["twenty"], 1.0)];
        let result = aggregate(&tasks, &mappings, &standard_lookup()).unwrap();

        assert_eq!(result.vulnerable_skills, vec!["data entry", "scheduling"]);
        assert_eq!(result.protected_skills, vec!["leadership", "empathy"]);
    }

    #[test]
    fn test_protected_patterns_ignored_on_high_tasks() {
        let tasks = vec![UserTask::new("Supervise the data entry team", 100.0)];
        let result = aggregate(&tasks, &[mapped(&["hi"], 1.0)], &standard_lookup()).unwrap();
        assert!(result.protected_skills.is_empty());
        assert_eq!(result.vulnerable_skills, vec!["data entry"]);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let lookup = standard_lookup();
        let one = vec![mapped(&["hi"], 1.0)];

        assert!(matches!(
            aggregate(&[], &[], &lookup),
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));
        assert!(matches!(
            aggregate(&[UserTask::new("a", 10.0), UserTask::new("b", 10.0)], &one, &lookup),
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));
        assert!(matches!(
            aggregate(&[UserTask::new("a", -5.0)], &one, &lookup),
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));
        assert!(matches!(
            aggregate(&[UserTask::new("a", f64::NAN)], &one, &lookup),
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));
        assert!(matches!(
            aggregate(&[UserTask::new("a", 0.0)], &one, &lookup),
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));
    }

    #[test]
    fn test_mark_partial_is_idempotent() {
        let tasks = vec![UserTask::new("a", 1.0)];
        let mut result = aggregate(&tasks, &[mapped(&["mid"], 1.0)], &standard_lookup()).unwrap();
        result.mark_partial();
        let summary = result.summary.clone();
        result.mark_partial();
        assert!(result.partial);
        assert_eq!(result.summary, summary);
    }
}

//! Activity Mapper: maps free-text tasks onto standardized detailed activities.
//!
//! Candidate pool: activities linked to the matched occupation (≤100), or a
//! catalogue-wide sample (≤500) when there is no usable hint.
//!
//! 2–10 tasks go out as one batched request; any other count is mapped one task
//! per request (bounded concurrency, results kept in task order).
//!
//! Fail-open: a failed or unusable response yields `ActivityMapping::fallback()`
//! (no activities, confidence 0.3, `fallback = true`) for the affected task(s).
//! So does a response whose ids all fall outside the pool, and any request
//! still running when the deadline passes. Requests that finished in time keep
//! their mappings. The aggregator then pulls fallback tasks toward neutral.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::assessment::errors::AssessmentError;
use crate::assessment::prompts::{
    ACTIVITY_MAP_BATCH_PROMPT_TEMPLATE, ACTIVITY_MAP_PROMPT_TEMPLATE, ACTIVITY_MAP_SYSTEM,
};
use crate::llm_client::prompts::CLOSED_LIST_INSTRUCTION;
use crate::models::{DetailedActivity, UserTask};
use crate::reference::ReferenceStore;
use crate::semantic::parse::{parse_json, unit_interval};
use crate::semantic::{self, ParseFailure, RetryPolicy, SemanticMatcher, SemanticRequest};

pub const FALLBACK_CONFIDENCE: f64 = 0.3;
const HINTED_POOL_LIMIT: usize = 100;
const CATALOGUE_POOL_LIMIT: usize = 500;
const MIN_BATCH_TASKS: usize = 2;
const MAX_BATCH_TASKS: usize = 10;
const MAX_ACTIVITIES_PER_TASK: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRef {
    pub activity_id: String,
    /// 0.0 – 1.0
    pub relevance: f64,
}

/// Activities selected for one task. May be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMapping {
    pub activities: Vec<ActivityRef>,
    /// 0.0 – 1.0
    pub mapping_confidence: f64,
    /// True when this is the fail-open default rather than a real mapping.
    pub fallback: bool,
}

impl ActivityMapping {
    pub fn new(activities: Vec<ActivityRef>, mapping_confidence: f64) -> Self {
        Self {
            activities,
            mapping_confidence,
            fallback: false,
        }
    }

    pub fn fallback() -> Self {
        Self {
            activities: Vec::new(),
            mapping_confidence: FALLBACK_CONFIDENCE,
            fallback: true,
        }
    }
}

/// One mapping per task, in task order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMappings {
    pub mappings: Vec<ActivityMapping>,
    /// Tasks that got the fallback because the deadline passed first.
    pub expired: usize,
}

impl TaskMappings {
    fn all_expired(task_count: usize) -> Self {
        Self {
            mappings: vec![ActivityMapping::fallback(); task_count],
            expired: task_count,
        }
    }
}

pub struct ActivityMapper {
    store: Arc<dyn ReferenceStore>,
    semantic: Arc<dyn SemanticMatcher>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl ActivityMapper {
    pub fn new(
        store: Arc<dyn ReferenceStore>,
        semantic: Arc<dyn SemanticMatcher>,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            semantic,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// One mapping per task, same order. Only reference-store failures are errors.
    ///
    /// Each semantic request runs under `deadline`; the ones still pending when it
    /// passes fall back without discarding the mappings that already came back.
    pub async fn map_tasks(
        &self,
        tasks: &[UserTask],
        occupation_hint: Option<&str>,
        deadline: Instant,
    ) -> Result<TaskMappings, AssessmentError> {
        if tasks.is_empty() {
            return Ok(TaskMappings {
                mappings: Vec::new(),
                expired: 0,
            });
        }

        let pool = match timeout_at(deadline, self.candidate_pool(occupation_hint)).await {
            Ok(pool) => pool?,
            Err(_) => {
                warn!("Deadline expired while loading candidate activities");
                return Ok(TaskMappings::all_expired(tasks.len()));
            }
        };
        if pool.is_empty() {
            warn!("No candidate activities available; every task gets the fallback mapping");
            return Ok(TaskMappings {
                mappings: vec![ActivityMapping::fallback(); tasks.len()],
                expired: 0,
            });
        }

        let slots: Vec<Option<ActivityMapping>> =
            if (MIN_BATCH_TASKS..=MAX_BATCH_TASKS).contains(&tasks.len()) {
                match timeout_at(deadline, self.map_batch(tasks, &pool)).await {
                    Ok(mappings) => mappings.into_iter().map(Some).collect(),
                    Err(_) => vec![None; tasks.len()],
                }
            } else {
                let requests: Vec<_> = tasks
                    .iter()
                    .map(|task| timeout_at(deadline, self.map_single(task, &pool)))
                    .collect();
                stream::iter(requests)
                    .buffered(self.concurrency)
                    .map(Result::ok)
                    .collect()
                    .await
            };

        let expired = slots.iter().filter(|slot| slot.is_none()).count();
        let mappings: Vec<ActivityMapping> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(ActivityMapping::fallback))
            .collect();

        let fallbacks = mappings.iter().filter(|m| m.fallback).count();
        info!(
            "Mapped {} task(s) against {} candidate activities ({} fallback, {} past deadline)",
            tasks.len(),
            pool.len(),
            fallbacks,
            expired
        );
        Ok(TaskMappings { mappings, expired })
    }

    async fn candidate_pool(
        &self,
        occupation_hint: Option<&str>,
    ) -> Result<Vec<DetailedActivity>, AssessmentError> {
        if let Some(code) = occupation_hint {
            let linked = self
                .store
                .activities_for_occupation(code, HINTED_POOL_LIMIT)
                .await?;
            if !linked.is_empty() {
                return Ok(linked);
            }
            debug!("Occupation {code} has no linked activities; using catalogue sample");
        }
        Ok(self.store.sample_activities(CATALOGUE_POOL_LIMIT).await?)
    }

    async fn map_single(&self, task: &UserTask, pool: &[DetailedActivity]) -> ActivityMapping {
        let prompt = ACTIVITY_MAP_PROMPT_TEMPLATE
            .replace("{task}", task.description.trim())
            .replace("{activities}", &format_activities(pool))
            .replace("{closed_list_instruction}", CLOSED_LIST_INSTRUCTION);
        let request = SemanticRequest::new(ACTIVITY_MAP_SYSTEM, prompt);
        let pool_ids = pool_ids(pool);

        match semantic::infer(self.semantic.as_ref(), &request, &self.retry, |text| {
            parse_single_mapping(text, &pool_ids)
        })
        .await
        {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("Activity mapping failed, using fallback: {e}");
                ActivityMapping::fallback()
            }
        }
    }

    async fn map_batch(&self, tasks: &[UserTask], pool: &[DetailedActivity]) -> Vec<ActivityMapping> {
        let task_list = tasks
            .iter()
            .enumerate()
            .map(|(idx, t)| format!("{idx}: {}", t.description.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = ACTIVITY_MAP_BATCH_PROMPT_TEMPLATE
            .replace("{tasks}", &task_list)
            .replace("{activities}", &format_activities(pool))
            .replace("{closed_list_instruction}", CLOSED_LIST_INSTRUCTION);
        let request = SemanticRequest::new(ACTIVITY_MAP_SYSTEM, prompt);
        let pool_ids = pool_ids(pool);

        let slots = match semantic::infer(self.semantic.as_ref(), &request, &self.retry, |text| {
            parse_batch_mapping(text, &pool_ids, tasks.len())
        })
        .await
        {
            Ok(slots) => slots,
            Err(e) => {
                warn!("Batched activity mapping failed, using fallback for all tasks: {e}");
                return vec![ActivityMapping::fallback(); tasks.len()];
            }
        };

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    warn!("Batched response had no usable entry for task {idx}; using fallback");
                    ActivityMapping::fallback()
                })
            })
            .collect()
    }
}

fn format_activities(pool: &[DetailedActivity]) -> String {
    pool.iter()
        .map(|a| format!("{}: {}", a.id, a.title))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pool_ids(pool: &[DetailedActivity]) -> HashSet<&str> {
    pool.iter().map(|a| a.id.as_str()).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Parse boundary
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ActivitySelectionDto {
    activities: Vec<ActivityRefDto>,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ActivityRefDto {
    activity_id: String,
    relevance: f64,
}

#[derive(Debug, Deserialize)]
struct BatchSelectionDto {
    tasks: Vec<BatchTaskDto>,
}

#[derive(Debug, Deserialize)]
struct BatchTaskDto {
    task_index: usize,
    #[serde(flatten)]
    selection: ActivitySelectionDto,
}

/// Drops ids outside the pool and duplicates, clamps scores, keeps at most five.
/// A selection left with no activities is the fallback mapping.
fn validate_selection(
    dto: ActivitySelectionDto,
    pool_ids: &HashSet<&str>,
) -> Result<ActivityMapping, ParseFailure> {
    let mapping_confidence = unit_interval(dto.confidence, "confidence")?;

    let mut seen = HashSet::new();
    let mut activities = Vec::new();
    for candidate in dto.activities {
        let id = candidate.activity_id.trim();
        if !pool_ids.contains(id) {
            debug!("Dropping activity '{id}' (not in candidate pool)");
            continue;
        }
        if !seen.insert(id.to_string()) {
            continue;
        }
        activities.push(ActivityRef {
            activity_id: id.to_string(),
            relevance: unit_interval(candidate.relevance, "relevance")?,
        });
        if activities.len() == MAX_ACTIVITIES_PER_TASK {
            break;
        }
    }

    if activities.is_empty() {
        debug!("No usable activity ids in selection; using fallback");
        return Ok(ActivityMapping::fallback());
    }
    Ok(ActivityMapping::new(activities, mapping_confidence))
}

fn parse_single_mapping(
    text: &str,
    pool_ids: &HashSet<&str>,
) -> Result<ActivityMapping, ParseFailure> {
    validate_selection(parse_json(text)?, pool_ids)
}

/// One slot per task; `None` where the response had nothing usable for that task.
fn parse_batch_mapping(
    text: &str,
    pool_ids: &HashSet<&str>,
    task_count: usize,
) -> Result<Vec<Option<ActivityMapping>>, ParseFailure> {
    let dto: BatchSelectionDto = parse_json(text)?;

    let mut slots: Vec<Option<ActivityMapping>> = vec![None; task_count];
    for entry in dto.tasks {
        let Some(slot) = slots.get_mut(entry.task_index) else {
            debug!("Ignoring mapping for unknown task index {}", entry.task_index);
            continue;
        };
        if slot.is_some() {
            continue;
        }
        *slot = validate_selection(entry.selection, pool_ids).ok();
    }
    Ok(slots)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

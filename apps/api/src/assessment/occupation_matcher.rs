//! Occupation Matcher: resolves a free-text job title to ranked occupation candidates.
//!
//! Stages, each attempted only when the previous one is not good enough:
//! 1. exact alternate-title match (confidence 0.95, short-circuits)
//! 2. keyword overlap against titles (accepted outright at ≥ 0.7)
//! 3. semantic fallback over a bounded catalogue sample (capped at 0.9)
//!
//! Semantic suggestions are validated against the sample that was offered;
//! anything else is discarded. A failed semantic call degrades to whatever the
//! partial stage found, possibly nothing.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assessment::errors::AssessmentError;
use crate::assessment::prompts::{OCCUPATION_MATCH_PROMPT_TEMPLATE, OCCUPATION_MATCH_SYSTEM};
use crate::llm_client::prompts::CLOSED_LIST_INSTRUCTION;
use crate::models::OccupationProfile;
use crate::reference::{ReferenceStore, TitleHit};
use crate::semantic::parse::{parse_json, unit_interval};
use crate::semantic::{self, ParseFailure, RetryPolicy, SemanticMatcher, SemanticRequest};

pub const EXACT_CONFIDENCE: f64 = 0.95;
const PARTIAL_CONFIDENCE_CAP: f64 = 0.85;
const PARTIAL_ACCEPT_CONFIDENCE: f64 = 0.7;
const SEMANTIC_CONFIDENCE_CAP: f64 = 0.9;
const SEMANTIC_MAX_MATCHES: usize = 3;
const SEMANTIC_SAMPLE_SIZE: usize = 40;
const TITLE_SEARCH_LIMIT: usize = 50;
/// Tokens this short or shorter are ignored ("of", "rn", "sr").
const MAX_IGNORED_TOKEN_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Partial,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupationMatch {
    pub occupation: OccupationProfile,
    pub match_type: MatchType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchHint {
    pub industry: Option<String>,
}

pub struct OccupationMatcher {
    store: Arc<dyn ReferenceStore>,
    semantic: Arc<dyn SemanticMatcher>,
    retry: RetryPolicy,
}

impl OccupationMatcher {
    pub fn new(
        store: Arc<dyn ReferenceStore>,
        semantic: Arc<dyn SemanticMatcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            semantic,
            retry,
        }
    }

    /// Ranked candidates for `job_title`, best first. Empty when nothing matched.
    pub async fn match_title(
        &self,
        job_title: &str,
        hint: &MatchHint,
    ) -> Result<Vec<OccupationMatch>, AssessmentError> {
        let job_title = job_title.trim();
        if job_title.is_empty() {
            return Ok(Vec::new());
        }

        // Stage 1: exact
        let exact = self.store.occupations_by_exact_title(job_title).await?;
        if !exact.is_empty() {
            info!("Exact occupation match for '{job_title}': {} hit(s)", exact.len());
            return Ok(exact
                .into_iter()
                .map(|occupation| OccupationMatch {
                    occupation,
                    match_type: MatchType::Exact,
                    confidence: EXACT_CONFIDENCE,
                })
                .collect());
        }

        // Stage 2: partial
        let tokens = tokenize(job_title);
        let partial = if tokens.is_empty() {
            Vec::new()
        } else {
            let hits = self.store.search_titles(&tokens, TITLE_SEARCH_LIMIT).await?;
            score_partial_hits(&tokens, hits)
        };

        if let Some(top) = partial.first() {
            if top.confidence >= PARTIAL_ACCEPT_CONFIDENCE {
                info!(
                    "Partial occupation match for '{job_title}': {} ({:.2})",
                    top.occupation.code, top.confidence
                );
                return Ok(partial);
            }
        }

        // Stage 3: semantic
        let semantic = self.semantic_stage(job_title, hint, &partial).await?;
        let merged = merge_matches(partial, semantic);
        info!(
            "Occupation match for '{job_title}' after semantic fallback: {} candidate(s)",
            merged.len()
        );
        Ok(merged)
    }

    /// First element of `match_title`, if any.
    pub async fn best_match(
        &self,
        job_title: &str,
        hint: &MatchHint,
    ) -> Result<Option<OccupationMatch>, AssessmentError> {
        Ok(self.match_title(job_title, hint).await?.into_iter().next())
    }

    async fn semantic_stage(
        &self,
        job_title: &str,
        hint: &MatchHint,
        partial: &[OccupationMatch],
    ) -> Result<Vec<OccupationMatch>, AssessmentError> {
        let catalogue_sample = self
            .store
            .sample_occupations(hint.industry.as_deref(), SEMANTIC_SAMPLE_SIZE)
            .await?;

        let mut seen = HashSet::new();
        let sample: Vec<OccupationProfile> = partial
            .iter()
            .map(|m| m.occupation.clone())
            .chain(catalogue_sample)
            .filter(|o| seen.insert(o.code.clone()))
            .take(SEMANTIC_SAMPLE_SIZE)
            .collect();

        if sample.is_empty() {
            return Ok(Vec::new());
        }

        let request = SemanticRequest::new(
            OCCUPATION_MATCH_SYSTEM,
            build_match_prompt(job_title, hint, &sample),
        );

        match semantic::infer(self.semantic.as_ref(), &request, &self.retry, |text| {
            parse_semantic_matches(text, &sample)
        })
        .await
        {
            Ok(matches) => Ok(matches),
            Err(e) => {
                warn!("Semantic occupation match failed for '{job_title}': {e}");
                Ok(Vec::new())
            }
        }
    }
}

/// Lowercased alphanumeric tokens longer than two characters, deduplicated in order.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > MAX_IGNORED_TOKEN_LEN)
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// min(0.85, 0.5 + 0.1 · overlap), computed in tenths so 0.7 compares exactly.
fn partial_confidence(overlap: usize) -> f64 {
    ((5 + overlap) as f64 / 10.0).min(PARTIAL_CONFIDENCE_CAP)
}

/// Best-scoring title per occupation, ranked by confidence; ties keep store order.
fn score_partial_hits(tokens: &[String], hits: Vec<TitleHit>) -> Vec<OccupationMatch> {
    let mut matches: Vec<OccupationMatch> = Vec::new();

    for hit in hits {
        let title = hit.title.to_lowercase();
        let overlap = tokens.iter().filter(|t| title.contains(t.as_str())).count();
        if overlap == 0 {
            continue;
        }
        let confidence = partial_confidence(overlap);

        match matches
            .iter_mut()
            .find(|m| m.occupation.code == hit.occupation.code)
        {
            Some(existing) if existing.confidence < confidence => existing.confidence = confidence,
            Some(_) => {}
            None => matches.push(OccupationMatch {
                occupation: hit.occupation,
                match_type: MatchType::Partial,
                confidence,
            }),
        }
    }

    sort_by_confidence(&mut matches);
    matches
}

fn build_match_prompt(job_title: &str, hint: &MatchHint, sample: &[OccupationProfile]) -> String {
    let candidates = sample
        .iter()
        .map(|o| format!("{}: {}", o.code, o.title))
        .collect::<Vec<_>>()
        .join("\n");

    OCCUPATION_MATCH_PROMPT_TEMPLATE
        .replace("{job_title}", job_title)
        .replace(
            "{industry}",
            hint.industry.as_deref().unwrap_or("not specified"),
        )
        .replace("{candidates}", &candidates)
        .replace("{closed_list_instruction}", CLOSED_LIST_INSTRUCTION)
}

#[derive(Debug, Deserialize)]
struct SemanticMatchesDto {
    matches: Vec<SemanticMatchDto>,
}

#[derive(Debug, Deserialize)]
struct SemanticMatchDto {
    code: String,
    confidence: f64,
}

/// Parses the collaborator's answer, keeping only codes from `sample`.
fn parse_semantic_matches(
    text: &str,
    sample: &[OccupationProfile],
) -> Result<Vec<OccupationMatch>, ParseFailure> {
    let dto: SemanticMatchesDto = parse_json(text)?;

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for suggestion in dto.matches {
        let code = suggestion.code.trim();
        let Some(occupation) = sample.iter().find(|o| o.code == code) else {
            debug!("Discarding semantic suggestion '{code}' (not in candidate sample)");
            continue;
        };
        if !seen.insert(occupation.code.clone()) {
            continue;
        }
        let confidence =
            unit_interval(suggestion.confidence, "confidence")?.min(SEMANTIC_CONFIDENCE_CAP);
        matches.push(OccupationMatch {
            occupation: occupation.clone(),
            match_type: MatchType::Semantic,
            confidence,
        });
        if matches.len() == SEMANTIC_MAX_MATCHES {
            break;
        }
    }

    sort_by_confidence(&mut matches);
    Ok(matches)
}

/// Folds semantic suggestions into partial hits; a code present in both keeps
/// whichever entry has the higher confidence.
fn merge_matches(
    mut partial: Vec<OccupationMatch>,
    semantic: Vec<OccupationMatch>,
) -> Vec<OccupationMatch> {
    for candidate in semantic {
        match partial
            .iter_mut()
            .find(|m| m.occupation.code == candidate.occupation.code)
        {
            Some(existing) if existing.confidence < candidate.confidence => *existing = candidate,
            Some(_) => {}
            None => partial.push(candidate),
        }
    }
    sort_by_confidence(&mut partial);
    partial
}

/// Stable descending sort.
fn sort_by_confidence(matches: &mut [OccupationMatch]) {
    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

//! Assessment pipeline: occupation → task mapping → exposure → recommendations.
//!
//! Stages run sequentially under one deadline. Expiry degrades instead of failing
//! once an occupation is known: tasks whose mapping had not come back fall back,
//! and recommendations come back empty. Either way the result is marked `partial`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::assessment::activity_mapper::{ActivityMapper, ActivityMapping};
use crate::assessment::aggregator::{self, ExposureResult};
use crate::assessment::errors::AssessmentError;
use crate::assessment::occupation_matcher::{
    MatchHint, MatchType, OccupationMatch, OccupationMatcher,
};
use crate::assessment::recommender::{CareerCandidate, RecommendationOptions, Recommender};
use crate::models::{DetailedActivity, UserTask};
use crate::reference::ReferenceStore;
use crate::semantic::{RetryPolicy, SemanticMatcher};

const CODE_HINT_CONFIDENCE: f64 = 1.0;

/// Core input, independent of the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct AssessmentInput {
    pub job_title: String,
    pub industry: Option<String>,
    /// Skips title matching when it names a known occupation.
    pub occupation_code: Option<String>,
    pub tasks: Vec<UserTask>,
    pub options: RecommendationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub occupation: OccupationMatch,
    pub exposure: ExposureResult,
    pub recommendations: Vec<CareerCandidate>,
}

pub struct AssessmentPipeline {
    store: Arc<dyn ReferenceStore>,
    matcher: OccupationMatcher,
    mapper: ActivityMapper,
    recommender: Recommender,
}

impl AssessmentPipeline {
    pub fn new(
        store: Arc<dyn ReferenceStore>,
        semantic: Arc<dyn SemanticMatcher>,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            matcher: OccupationMatcher::new(store.clone(), semantic.clone(), retry.clone()),
            mapper: ActivityMapper::new(store.clone(), semantic, retry, concurrency),
            recommender: Recommender::new(store.clone(), concurrency),
            store,
        }
    }

    pub fn matcher(&self) -> &OccupationMatcher {
        &self.matcher
    }

    pub fn store(&self) -> &Arc<dyn ReferenceStore> {
        &self.store
    }

    pub async fn assess(
        &self,
        input: &AssessmentInput,
        deadline: Instant,
    ) -> Result<Assessment, AssessmentError> {
        aggregator::validate_tasks(&input.tasks)?;
        if let Some(blank) = input.tasks.iter().position(|t| t.description.trim().is_empty()) {
            return Err(AssessmentError::EmptyOrInvalidTaskInput(format!(
                "task {blank} has an empty description"
            )));
        }

        // Stage 1: occupation
        let occupation = self.resolve_occupation(input, deadline).await?;
        let code = occupation.occupation.code.clone();
        info!(
            "Assessing '{}' as {} ({:?}, {:.2})",
            input.job_title, code, occupation.match_type, occupation.confidence
        );

        // Stage 2: task → activities
        let mut partial = false;
        let mapped = self
            .mapper
            .map_tasks(&input.tasks, Some(code.as_str()), deadline)
            .await?;
        if mapped.expired > 0 {
            warn!(
                "Deadline expired while mapping; {} of {} task(s) use the fallback mapping",
                mapped.expired,
                input.tasks.len()
            );
            partial = true;
        }
        let mappings = mapped.mappings;

        // Stage 3: exposure
        let lookup = self.activity_lookup(&mappings).await?;
        let mut exposure = aggregator::aggregate(&input.tasks, &mappings, &lookup)?;

        // Stage 4: recommendations
        let recommendations = match timeout_at(
            deadline,
            self.recommend(&occupation, exposure.risk_score, &input.options),
        )
        .await
        {
            Ok(recommendations) => recommendations?,
            Err(_) => {
                warn!("Deadline expired while ranking recommendations; returning none");
                partial = true;
                Vec::new()
            }
        };

        if partial {
            exposure.mark_partial();
        }

        Ok(Assessment {
            occupation,
            exposure,
            recommendations,
        })
    }

    async fn resolve_occupation(
        &self,
        input: &AssessmentInput,
        deadline: Instant,
    ) -> Result<OccupationMatch, AssessmentError> {
        if let Some(code) = input.occupation_code.as_deref() {
            match self.store.occupation(code).await? {
                Some(occupation) => {
                    return Ok(OccupationMatch {
                        occupation,
                        match_type: MatchType::Exact,
                        confidence: CODE_HINT_CONFIDENCE,
                    })
                }
                None => warn!("Unknown occupation code '{code}'; matching by title instead"),
            }
        }

        let hint = MatchHint {
            industry: input.industry.clone(),
        };
        match timeout_at(deadline, self.matcher.best_match(&input.job_title, &hint)).await {
            Ok(Ok(Some(found))) => Ok(found),
            Ok(Ok(None)) => Err(AssessmentError::NoOccupationMatch(input.job_title.clone())),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Deadline expired before an occupation was resolved");
                Err(AssessmentError::NoOccupationMatch(input.job_title.clone()))
            }
        }
    }

    async fn activity_lookup(
        &self,
        mappings: &[ActivityMapping],
    ) -> Result<HashMap<String, DetailedActivity>, AssessmentError> {
        let mut ids: Vec<String> = mappings
            .iter()
            .flat_map(|m| m.activities.iter().map(|a| a.activity_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self.store.activities_by_id(&ids).await?)
    }

    async fn recommend(
        &self,
        occupation: &OccupationMatch,
        current_exposure: f64,
        options: &RecommendationOptions,
    ) -> Result<Vec<CareerCandidate>, AssessmentError> {
        let pool = self
            .recommender
            .candidate_pool(&occupation.occupation.code)
            .await?;
        self.recommender
            .recommend(&occupation.occupation, current_exposure, &pool, options)
            .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reference::memory::fixtures::sample_store;
    use crate::semantic::mock::ScriptedMatcher;

    fn pipeline(semantic: &ScriptedMatcher) -> AssessmentPipeline {
        AssessmentPipeline::new(
            Arc::new(sample_store()),
            Arc::new(semantic.clone()),
            RetryPolicy::new(1, Duration::ZERO),
            4,
        )
    }

    fn nurse_input() -> AssessmentInput {
        AssessmentInput {
            job_title: "Registered Nurse".to_string(),
            tasks: vec![
                UserTask::new("Chart patient vitals in the records system", 40.0),
                UserTask::new("Comfort patients and families", 60.0),
            ],
            ..Default::default()
        }
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_full_assessment() {
        let semantic = ScriptedMatcher::replying(&[r#"{"tasks": [
            {"task_index": 0, "activities": [{"activity_id": "act.records", "relevance": 0.9}], "confidence": 1.0},
            {"task_index": 1, "activities": [{"activity_id": "act.patient_care", "relevance": 0.9}], "confidence": 1.0}
        ]}"#]);
        let pipeline = pipeline(&semantic);

        let assessment = pipeline.assess(&nurse_input(), later()).await.unwrap();

        // exact title match, then one batched mapping call
        assert_eq!(semantic.call_count(), 1);
        assert_eq!(assessment.occupation.match_type, MatchType::Exact);
        assert_eq!(assessment.occupation.occupation.code, "29-1141.00");

        // 0.4·80 + 0.6·15
        assert_eq!(assessment.exposure.risk_score, 41.0);
        assert!(!assessment.exposure.partial);
        assert_eq!(assessment.exposure.fallback_task_count, 0);

        let codes: Vec<_> = assessment
            .recommendations
            .iter()
            .map(|c| c.occupation.code.as_str())
            .collect();
        assert_eq!(codes, vec!["21-1014.00", "11-9111.00"]);
    }

    #[tokio::test]
    async fn test_code_hint_skips_title_matching() {
        let semantic = ScriptedMatcher::replying(&[r#"{"tasks": []}"#]);
        let pipeline = pipeline(&semantic);
        let input = AssessmentInput {
            job_title: "Code wrangler".to_string(),
            occupation_code: Some("15-1252.00".to_string()),
            ..nurse_input()
        };

        let assessment = pipeline.assess(&input, later()).await.unwrap();

        assert_eq!(semantic.call_count(), 1);
        assert_eq!(assessment.occupation.occupation.code, "15-1252.00");
        assert_eq!(assessment.occupation.confidence, CODE_HINT_CONFIDENCE);
        assert_eq!(assessment.exposure.fallback_task_count, 2);
    }

    #[tokio::test]
    async fn test_no_occupation_match() {
        let semantic = ScriptedMatcher::replying(&[r#"{"matches": []}"#]);
        let pipeline = pipeline(&semantic);
        let input = AssessmentInput {
            job_title: "Zyx qwv".to_string(),
            ..nurse_input()
        };

        let err = pipeline.assess(&input, later()).await.unwrap_err();
        assert!(matches!(err, AssessmentError::NoOccupationMatch(_)));
    }

    #[tokio::test]
    async fn test_invalid_tasks_rejected_before_any_call() {
        let semantic = ScriptedMatcher::default();
        let pipeline = pipeline(&semantic);

        let empty = AssessmentInput {
            tasks: vec![],
            ..nurse_input()
        };
        assert!(matches!(
            pipeline.assess(&empty, later()).await,
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));

        let blank = AssessmentInput {
            tasks: vec![UserTask::new("   ", 100.0)],
            ..nurse_input()
        };
        assert!(matches!(
            pipeline.assess(&blank, later()).await,
            Err(AssessmentError::EmptyOrInvalidTaskInput(_))
        ));
        assert_eq!(semantic.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_mapping_falls_back() {
        let semantic = ScriptedMatcher::replying(&[r#"{"tasks": []}"#])
            .with_delay(Duration::from_secs(120));
        let pipeline = pipeline(&semantic);

        let assessment = pipeline.assess(&nurse_input(), later()).await.unwrap();

        assert!(assessment.exposure.partial);
        assert_eq!(assessment.exposure.fallback_task_count, 2);
        assert_eq!(assessment.exposure.risk_score, 50.0);
        assert!(assessment.exposure.summary.contains("time limit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_tasks_mapped_in_time() {
        let reply = r#"{"activities": [{"activity_id": "act.records", "relevance": 1.0}], "confidence": 1.0}"#;
        let semantic =
            ScriptedMatcher::replying(&[reply; 12]).with_delay(Duration::from_secs(10));
        let pipeline = pipeline(&semantic);
        let input = AssessmentInput {
            tasks: (0..12)
                .map(|i| UserTask::new(format!("Update chart batch {i}"), 10.0))
                .collect(),
            ..nurse_input()
        };

        let deadline = Instant::now() + Duration::from_secs(25);
        let assessment = pipeline.assess(&input, deadline).await.unwrap();

        assert!(assessment.exposure.partial);
        assert_eq!(assessment.exposure.fallback_task_count, 4);
        // 8 tasks at 80, 4 at the neutral 50
        assert_eq!(assessment.exposure.risk_score, 70.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_occupation_resolved() {
        let semantic = ScriptedMatcher::replying(&[r#"{"matches": []}"#])
            .with_delay(Duration::from_secs(120));
        let pipeline = pipeline(&semantic);
        let input = AssessmentInput {
            job_title: "Zyx qwv".to_string(),
            ..nurse_input()
        };

        let err = pipeline.assess(&input, later()).await.unwrap_err();
        assert!(matches!(err, AssessmentError::NoOccupationMatch(_)));
    }
}

//! Axum route handlers for the Assessment API.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::assessment::aggregator::ExposureResult;
use crate::assessment::occupation_matcher::{MatchHint, OccupationMatch};
use crate::assessment::pipeline::AssessmentInput;
use crate::assessment::recommender::{CareerCandidate, RecommendationOptions};
use crate::errors::AppError;
use crate::models::{OccupationProfile, UserTask};
use crate::state::AppState;

const MAX_TASKS: usize = 50;
const MAX_DEADLINE_SECS: u64 = 300;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssessmentRequest {
    pub job_title: String,
    pub industry: Option<String>,
    pub occupation_code: Option<String>,
    pub tasks: Vec<UserTask>,
    #[serde(default)]
    pub recommendation_options: RecommendationOptions,
    /// Overrides the configured deadline, capped at five minutes.
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AssessmentResponse {
    pub assessment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub occupation: OccupationMatch,
    pub exposure: ExposureResult,
    pub recommendations: Vec<CareerCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct MatchOccupationRequest {
    pub job_title: String,
    pub industry: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchOccupationResponse {
    pub matches: Vec<OccupationMatch>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/assessments
///
/// Full pipeline: occupation match → task mapping → exposure → recommendations.
pub async fn handle_create_assessment(
    State(state): State<AppState>,
    Json(request): Json<AssessmentRequest>,
) -> Result<Json<AssessmentResponse>, AppError> {
    if request.job_title.trim().is_empty() && request.occupation_code.is_none() {
        return Err(AppError::Validation(
            "job_title cannot be empty unless occupation_code is given".to_string(),
        ));
    }
    if request.tasks.len() > MAX_TASKS {
        return Err(AppError::Validation(format!(
            "at most {MAX_TASKS} tasks can be assessed at once"
        )));
    }
    if request.recommendation_options.limit == 0 {
        return Err(AppError::Validation(
            "recommendation_options.limit must be at least 1".to_string(),
        ));
    }

    let budget = match request.deadline_secs {
        Some(secs) => std::time::Duration::from_secs(secs.clamp(1, MAX_DEADLINE_SECS)),
        None => state.config.assessment_deadline,
    };
    let deadline = Instant::now() + budget;

    let input = AssessmentInput {
        job_title: request.job_title,
        industry: request.industry,
        occupation_code: request.occupation_code,
        tasks: request.tasks,
        options: request.recommendation_options,
    };
    let assessment = state.pipeline.assess(&input, deadline).await?;

    let assessment_id = Uuid::new_v4();
    info!(
        "Assessment {assessment_id}: {} scored {:.1} with {} recommendation(s)",
        assessment.occupation.occupation.code,
        assessment.exposure.risk_score,
        assessment.recommendations.len()
    );

    Ok(Json(AssessmentResponse {
        assessment_id,
        created_at: Utc::now(),
        occupation: assessment.occupation,
        exposure: assessment.exposure,
        recommendations: assessment.recommendations,
    }))
}

/// POST /api/v1/occupations/match
///
/// Ranked occupation candidates for a job title, without running an assessment.
pub async fn handle_match_occupation(
    State(state): State<AppState>,
    Json(request): Json<MatchOccupationRequest>,
) -> Result<Json<MatchOccupationResponse>, AppError> {
    if request.job_title.trim().is_empty() {
        return Err(AppError::Validation("job_title cannot be empty".to_string()));
    }

    let hint = MatchHint {
        industry: request.industry,
    };
    let matches = state
        .pipeline
        .matcher()
        .match_title(&request.job_title, &hint)
        .await?;

    Ok(Json(MatchOccupationResponse { matches }))
}

/// GET /api/v1/occupations/:code
pub async fn handle_get_occupation(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<OccupationProfile>, AppError> {
    let occupation = state
        .pipeline
        .store()
        .occupation(&code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Occupation {code} not found")))?;

    Ok(Json(occupation))
}

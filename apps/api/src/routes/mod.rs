pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::assessment::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Assessment API
        .route(
            "/api/v1/assessments",
            post(handlers::handle_create_assessment),
        )
        // Occupation API
        .route(
            "/api/v1/occupations/match",
            post(handlers::handle_match_occupation),
        )
        .route(
            "/api/v1/occupations/:code",
            get(handlers::handle_get_occupation),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::assessment::pipeline::AssessmentPipeline;
    use crate::config::{Config, ReferenceSource};
    use crate::reference::memory::fixtures::sample_store;
    use crate::semantic::mock::ScriptedMatcher;
    use crate::semantic::RetryPolicy;

    fn app(semantic: ScriptedMatcher) -> Router {
        let config = Config {
            reference_source: ReferenceSource::File(PathBuf::from("unused.json")),
            anthropic_api_key: "sk-test".to_string(),
            port: 0,
            rust_log: "info".to_string(),
            semantic_max_attempts: 1,
            semantic_backoff: Duration::ZERO,
            assessment_deadline: Duration::from_secs(60),
            recommendation_concurrency: 2,
        };
        let pipeline = AssessmentPipeline::new(
            Arc::new(sample_store()),
            Arc::new(semantic),
            RetryPolicy::new(1, Duration::ZERO),
            2,
        );
        build_router(AppState {
            pipeline: Arc::new(pipeline),
            config,
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(ScriptedMatcher::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["service"], "exposure-api");
    }

    #[tokio::test]
    async fn test_create_assessment() {
        let semantic = ScriptedMatcher::replying(&[r#"{"activities": [{"activity_id": "act.records", "relevance": 1.0}], "confidence": 0.9}"#]);
        let request = post_json(
            "/api/v1/assessments",
            json!({
                "job_title": "RN",
                "tasks": [{"description": "Update patient charts", "time_share": 100}]
            }),
        );

        let response = app(semantic).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["occupation"]["occupation"]["code"], "29-1141.00");
        assert_eq!(body["occupation"]["match_type"], "exact");
        assert_eq!(body["exposure"]["partial"], false);
        assert!(body["assessment_id"].is_string());
        let breakdown = &body["exposure"]["category_breakdown"];
        let total = breakdown["low"].as_u64().unwrap()
            + breakdown["medium"].as_u64().unwrap()
            + breakdown["high"].as_u64().unwrap();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn test_empty_tasks_rejected() {
        let request = post_json(
            "/api/v1/assessments",
            json!({"job_title": "RN", "tasks": []}),
        );
        let response = app(ScriptedMatcher::default()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unmatched_title_is_unprocessable() {
        let request = post_json(
            "/api/v1/assessments",
            json!({
                "job_title": "Zyx qwv",
                "tasks": [{"description": "Something", "time_share": 100}]
            }),
        );
        let response = app(ScriptedMatcher::replying(&[r#"{"matches": []}"#]))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"]["code"], "NO_OCCUPATION_MATCH");
    }

    #[tokio::test]
    async fn test_match_occupation() {
        let request = post_json(
            "/api/v1/occupations/match",
            json!({"job_title": "Software Engineer"}),
        );
        let response = app(ScriptedMatcher::default()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["matches"][0]["occupation"]["code"], "15-1252.00");
        assert_eq!(body["matches"][0]["confidence"], 0.95);
    }

    #[tokio::test]
    async fn test_get_occupation() {
        let router = app(ScriptedMatcher::default());

        let found = router
            .clone()
            .oneshot(Request::get("/api/v1/occupations/43-9021.00").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(body_json(found).await["title"], "Data Entry Keyers");

        let missing = router
            .oneshot(Request::get("/api/v1/occupations/00-0000.00").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}

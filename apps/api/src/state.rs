use std::sync::Arc;

use crate::assessment::pipeline::AssessmentPipeline;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the reference store and semantic matcher trait objects.
    pub pipeline: Arc<AssessmentPipeline>,
    pub config: Config,
}

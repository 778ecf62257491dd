mod assessment;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod reference;
mod routes;
mod semantic;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assessment::pipeline::AssessmentPipeline;
use crate::config::{Config, ReferenceSource};
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::reference::{InMemoryReferenceStore, PgReferenceStore, ReferenceStore};
use crate::routes::build_router;
use crate::semantic::{LlmSemanticMatcher, RetryPolicy, SemanticMatcher};
use crate::state::AppState;

/// Slack on top of the pipeline deadline before the HTTP layer gives up.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Exposure API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize reference data
    let store = build_reference_store(&config).await?;

    // Initialize LLM-backed semantic matcher
    let llm = LlmClient::new(config.anthropic_api_key.clone())
        .context("Failed to build LLM client")?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);
    let semantic: Arc<dyn SemanticMatcher> = Arc::new(LlmSemanticMatcher(llm));

    let retry = RetryPolicy::new(config.semantic_max_attempts, config.semantic_backoff);
    info!(
        "Semantic retry: {} attempt(s), {}ms base backoff; deadline {}s; concurrency {}",
        retry.max_attempts(),
        config.semantic_backoff.as_millis(),
        config.assessment_deadline.as_secs(),
        config.recommendation_concurrency
    );

    let pipeline = AssessmentPipeline::new(
        store,
        semantic,
        retry,
        config.recommendation_concurrency,
    );

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(
            config.assessment_deadline + REQUEST_TIMEOUT_SLACK,
        ))
        .layer(CorsLayer::permissive()); // TODO: tighten CORS once the web client origin is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// JSON catalogue when `REFERENCE_DATA_PATH` is set, PostgreSQL otherwise.
async fn build_reference_store(config: &Config) -> Result<Arc<dyn ReferenceStore>> {
    match &config.reference_source {
        ReferenceSource::File(path) => {
            let store = InMemoryReferenceStore::from_json_file(path)
                .with_context(|| format!("Failed to load reference catalogue {}", path.display()))?;
            Ok(Arc::new(store))
        }
        ReferenceSource::Postgres(url) => {
            let pool = create_pool(url).await?;
            Ok(Arc::new(PgReferenceStore::new(pool)))
        }
    }
}

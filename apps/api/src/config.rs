use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Where occupation/activity reference data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSource {
    /// JSON catalogue loaded into memory at startup.
    File(PathBuf),
    Postgres(String),
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub reference_source: ReferenceSource,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub semantic_max_attempts: u32,
    pub semantic_backoff: Duration,
    pub assessment_deadline: Duration,
    pub recommendation_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let reference_source = match (lookup("REFERENCE_DATA_PATH"), lookup("DATABASE_URL")) {
            (Some(path), _) => ReferenceSource::File(PathBuf::from(path)),
            (None, Some(url)) => ReferenceSource::Postgres(url),
            (None, None) => bail!(
                "Either 'REFERENCE_DATA_PATH' or 'DATABASE_URL' must be set to load reference data"
            ),
        };

        Ok(Config {
            reference_source,
            anthropic_api_key: require(&lookup, "ANTHROPIC_API_KEY")?,
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            semantic_max_attempts: parse_or(&lookup, "SEMANTIC_MAX_ATTEMPTS", 3)?,
            semantic_backoff: Duration::from_millis(parse_or(&lookup, "SEMANTIC_BACKOFF_MS", 500)?),
            assessment_deadline: Duration::from_secs(parse_or(
                &lookup,
                "ASSESSMENT_DEADLINE_SECS",
                60,
            )?),
            recommendation_concurrency: parse_or(&lookup, "RECOMMENDATION_CONCURRENCY", 4)?,
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("'{key}' has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}

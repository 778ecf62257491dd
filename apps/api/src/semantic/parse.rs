//! Strict parse boundary for semantic-collaborator output.
//!
//! Never panics and never lets a serde error escape untyped: callers get
//! `Ok(T)` or a `ParseFailure` and nothing else.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("Semantic response was empty")]
    Empty,

    #[error("Semantic response is not the expected JSON shape: {0}")]
    Malformed(String),

    #[error("Semantic response broke the contract: {0}")]
    Contract(String),
}

/// Strips optional code fences and deserializes the payload as `T`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseFailure> {
    let text = strip_json_fences(text);
    if text.is_empty() {
        return Err(ParseFailure::Empty);
    }
    serde_json::from_str(text).map_err(|e| ParseFailure::Malformed(e.to_string()))
}

/// Clamps a model-reported score into [0, 1]. Non-finite values are a contract breach.
pub fn unit_interval(value: f64, field: &str) -> Result<f64, ParseFailure> {
    if !value.is_finite() {
        return Err(ParseFailure::Contract(format!("{field} is not a finite number")));
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

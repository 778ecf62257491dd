//! Semantic Matching: the external collaborator that ranks free text against a
//! bounded candidate list.
//!
//! Contract: a bounded prompt goes in, raw text comes out. The core never trusts
//! that text directly. Every stage runs it through `parse::parse_json` and then
//! validates each identifier against the list it offered. Any failure on that
//! path is a `SemanticInferenceFailure`, which callers turn into their documented
//! fallback instead of propagating.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm_client::{LlmClient, LlmError};

pub mod parse;
pub mod retry;

#[cfg(test)]
pub mod mock;

pub use parse::ParseFailure;
pub use retry::RetryPolicy;

/// A single request to the semantic collaborator.
#[derive(Debug, Clone)]
pub struct SemanticRequest {
    pub system: String,
    pub prompt: String,
}

impl SemanticRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Semantic call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Semantic backend unavailable: {0}")]
    Unavailable(String),
}

impl SemanticError {
    pub fn is_transient(&self) -> bool {
        match self {
            SemanticError::Llm(e) => e.is_transient(),
            SemanticError::Timeout(_) => true,
            SemanticError::Unavailable(_) => false,
        }
    }
}

/// Either the call failed (after retries) or its answer could not be used.
#[derive(Debug, Error)]
pub enum SemanticInferenceFailure {
    #[error(transparent)]
    Call(#[from] SemanticError),

    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

/// The semantic collaborator port. Carried in `AppState` as `Arc<dyn SemanticMatcher>`.
#[async_trait]
pub trait SemanticMatcher: Send + Sync {
    async fn complete(&self, request: &SemanticRequest) -> Result<String, SemanticError>;

    /// Backend label for logs ("llm", "scripted", ...).
    fn backend(&self) -> &'static str;
}

/// Sends `request` with the retry policy and runs the response through `parse`.
/// Both failure paths come back as one `SemanticInferenceFailure`.
pub async fn infer<T, F>(
    matcher: &dyn SemanticMatcher,
    request: &SemanticRequest,
    policy: &RetryPolicy,
    parse: F,
) -> Result<T, SemanticInferenceFailure>
where
    F: FnOnce(&str) -> Result<T, ParseFailure>,
{
    let text = retry::complete_with_retry(matcher, request, policy).await?;
    Ok(parse(&text)?)
}

// ────────────────────────────────────────────────────────────────────────────
// LlmSemanticMatcher: Claude-backed implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmSemanticMatcher(pub LlmClient);

#[async_trait]
impl SemanticMatcher for LlmSemanticMatcher {
    async fn complete(&self, request: &SemanticRequest) -> Result<String, SemanticError> {
        Ok(self.0.call_text(&request.prompt, &request.system).await?)
    }

    fn backend(&self) -> &'static str {
        "llm"
    }
}

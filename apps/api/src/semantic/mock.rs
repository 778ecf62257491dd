//! Scripted semantic matcher for tests.
//!
//! Replies are consumed in order; once the script runs out every call fails
//! permanently, which exercises the fallback paths.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::semantic::{SemanticError, SemanticMatcher, SemanticRequest};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Retryable failure (simulated timeout).
    Transient,
    /// Non-retryable failure.
    Permanent,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedMatcher {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl ScriptedMatcher {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| ScriptedReply::Text(t.to_string()))
                .collect(),
        )
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticMatcher for ScriptedMatcher {
    async fn complete(&self, request: &SemanticRequest) -> Result<String, SemanticError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Transient) => Err(SemanticError::Timeout(Duration::from_secs(30))),
            Some(ScriptedReply::Permanent) | None => Err(SemanticError::Unavailable(
                "scripted matcher has no reply".to_string(),
            )),
        }
    }

    fn backend(&self) -> &'static str {
        "scripted"
    }
}

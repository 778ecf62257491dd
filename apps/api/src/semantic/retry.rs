use std::time::Duration;

use tracing::warn;

use crate::semantic::{SemanticError, SemanticMatcher, SemanticRequest};

/// Bounded retry with exponential backoff: base, 2×base, 4×base, ...
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Calls the matcher until it succeeds, fails permanently, or attempts run out.
pub async fn complete_with_retry(
    matcher: &dyn SemanticMatcher,
    request: &SemanticRequest,
    policy: &RetryPolicy,
) -> Result<String, SemanticError> {
    let mut attempt = 1;
    loop {
        match matcher.complete(request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Semantic call ({}) attempt {}/{} failed: {e}; retrying after {}ms",
                    matcher.backend(),
                    attempt,
                    policy.max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::mock::{ScriptedMatcher, ScriptedReply};

    fn request() -> SemanticRequest {
        SemanticRequest::new("system", "prompt")
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let matcher = ScriptedMatcher::new(vec![
            ScriptedReply::Transient,
            ScriptedReply::Text("ok".to_string()),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_millis(500));

        let text = complete_with_retry(&matcher, &request(), &policy).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(matcher.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let matcher = ScriptedMatcher::new(vec![
            ScriptedReply::Transient,
            ScriptedReply::Transient,
            ScriptedReply::Transient,
            ScriptedReply::Text("too late".to_string()),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_millis(500));

        let result = complete_with_retry(&matcher, &request(), &policy).await;
        assert!(result.is_err());
        assert_eq!(matcher.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let matcher = ScriptedMatcher::new(vec![
            ScriptedReply::Permanent,
            ScriptedReply::Text("never reached".to_string()),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_millis(500));

        assert!(complete_with_retry(&matcher, &request(), &policy).await.is_err());
        assert_eq!(matcher.call_count(), 1);
    }
}

use serde::{Deserialize, Serialize};

/// A free-text task from the person being assessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTask {
    pub description: String,
    /// Percentage of work time, 0 – 100. Normalized across tasks before aggregation.
    pub time_share: f64,
}

impl UserTask {
    pub fn new(description: impl Into<String>, time_share: f64) -> Self {
        Self {
            description: description.into(),
            time_share,
        }
    }
}

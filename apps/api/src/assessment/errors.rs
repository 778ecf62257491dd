use thiserror::Error;

use crate::reference::StoreError;

/// Pipeline-wide failures. Per-task and per-candidate problems never show up
/// here; they degrade into fallback values with reduced confidence instead.
#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("Could not determine an occupation for '{0}'")]
    NoOccupationMatch(String),

    #[error("Invalid task input: {0}")]
    EmptyOrInvalidTaskInput(String),

    #[error("Reference data unavailable: {0}")]
    ReferenceDataUnavailable(#[from] StoreError),
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::reference::StoreError;

/// A standardized unit of work carrying a precomputed automation-exposure score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedActivity {
    pub id: String,
    pub title: String,
    /// 0 – 100
    pub exposure_score: f64,
    /// 0.0 – 1.0, how reliable the offline scoring was
    pub confidence: f64,
}

impl DetailedActivity {
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(0.0..=100.0).contains(&self.exposure_score) {
            return Err(StoreError::InvalidRow(format!(
                "activity {} has exposure score {} outside 0..=100",
                self.id, self.exposure_score
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(StoreError::InvalidRow(format!(
                "activity {} has confidence {} outside 0..=1",
                self.id, self.confidence
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DetailedActivityRow {
    pub id: String,
    pub title: String,
    pub exposure_score: f64,
    pub confidence: f64,
}

impl TryFrom<DetailedActivityRow> for DetailedActivity {
    type Error = StoreError;

    fn try_from(row: DetailedActivityRow) -> Result<Self, Self::Error> {
        let activity = DetailedActivity {
            id: row.id,
            title: row.title,
            exposure_score: row.exposure_score,
            confidence: row.confidence,
        };
        activity.validate()?;
        Ok(activity)
    }
}

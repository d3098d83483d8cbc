//! Daily mess rating model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lowest and highest accepted food score.
pub const MESS_SCORE_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// A single rating: one per user per UTC day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessRating {
    pub id: String,
    pub user_id: String,
    pub rating_date: NaiveDate,
    pub score: i64,
}

/// Request body for rating today's food.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateMessRequest {
    pub score: i64,
}

/// Aggregate of today's ratings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessSummary {
    pub rating_date: NaiveDate,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

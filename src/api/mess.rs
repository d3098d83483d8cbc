//! Daily mess rating endpoints.

use axum::{extract::State, Json};
use chrono::Utc;

use super::{error, require_viewer, success, ApiResult};
use crate::auth::Viewer;
use crate::errors::AppError;
use crate::models::{ChangeKind, MessRating, MessSummary, RateMessRequest, Table, MESS_SCORE_RANGE};
use crate::AppState;

/// GET /api/mess/today - Summary of today's ratings.
pub async fn mess_today(State(state): State<AppState>) -> ApiResult<MessSummary> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mess_summary(Utc::now().date_naive()).await {
        Ok(summary) => success(summary, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/mess/today - Rate today's food, once per viewer per day.
pub async fn rate_mess(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(request): Json<RateMessRequest>,
) -> ApiResult<MessRating> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let rater = match require_viewer(&state, &viewer).await {
        Ok(profile) => profile,
        Err(e) => return error(e, revision_id),
    };

    if !MESS_SCORE_RANGE.contains(&request.score) {
        return error(
            AppError::Validation(format!(
                "Score must be between {} and {}",
                MESS_SCORE_RANGE.start(),
                MESS_SCORE_RANGE.end()
            )),
            revision_id,
        );
    }

    match state
        .repo
        .rate_mess(&rater.id, Utc::now().date_naive(), request.score)
        .await
    {
        Ok(rating) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .realtime
                .publish(new_revision, Table::MessRatings, ChangeKind::Insert, &rating);
            success(rating, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

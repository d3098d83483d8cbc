//! Profile and community API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    ChangeKind, Community, CreateCommunityRequest, CreateProfileRequest, Profile, Table,
};
use crate::AppState;

/// POST /api/profiles - Create a new profile.
pub async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.username.trim().is_empty() {
        return error(
            AppError::Validation("Username is required".to_string()),
            revision_id,
        );
    }

    match state.repo.create_profile(&request).await {
        Ok(profile) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(profile, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/profiles/:id - Get a single profile.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_profile(&id).await {
        Ok(Some(profile)) => success(profile, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Profile {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/communities - List all communities.
pub async fn list_communities(State(state): State<AppState>) -> ApiResult<Vec<Community>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_communities().await {
        Ok(communities) => success(communities, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/communities - Create a new community.
pub async fn create_community(
    State(state): State<AppState>,
    Json(request): Json<CreateCommunityRequest>,
) -> ApiResult<Community> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.name.trim().is_empty() {
        return error(
            AppError::Validation("Community name is required".to_string()),
            revision_id,
        );
    }

    match state.repo.create_community(&request).await {
        Ok(community) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.realtime.publish(
                new_revision,
                Table::Communities,
                ChangeKind::Insert,
                &community,
            );
            success(community, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

//! Post and vote API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, require_viewer, success, ApiResult};
use crate::auth::Viewer;
use crate::errors::AppError;
use crate::models::{
    CastVoteRequest, ChangeKind, CreatePostRequest, FeedQuery, Post, Table, VoteTally,
};
use crate::AppState;

/// GET /api/posts - Feed query: sort, community filter, title search.
pub async fn list_posts(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Vec<Post>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_posts(&query, viewer.id()).await {
        Ok(posts) => success(posts, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/posts/:id - Get a single post.
pub async fn get_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> ApiResult<Post> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_post(&id, viewer.id()).await {
        Ok(Some(post)) => success(post, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Post {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/posts - Create a new post as the viewer.
pub async fn create_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<Post> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let author = match require_viewer(&state, &viewer).await {
        Ok(profile) => profile,
        Err(e) => return error(e, revision_id),
    };

    // Validate required fields
    if request.title.trim().is_empty() {
        return error(
            AppError::Validation("Title is required".to_string()),
            revision_id,
        );
    }
    if request.content.trim().is_empty() {
        return error(
            AppError::Validation("Content is required".to_string()),
            revision_id,
        );
    }
    if request.community_id.trim().is_empty() {
        return error(
            AppError::Validation("Community is required".to_string()),
            revision_id,
        );
    }

    match state.repo.create_post(&author.id, &request).await {
        Ok(post) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            tracing::info!("Post {} created in community {}", post.id, post.community_id);
            // Subscribers see the row without the author's own vote.
            let pushed = Post {
                my_vote: None,
                ..post.clone()
            };
            state
                .realtime
                .publish(new_revision, Table::Posts, ChangeKind::Insert, &pushed);
            success(post, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/posts/:id/vote - Insert or replace the viewer's vote.
pub async fn cast_vote(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
    Json(request): Json<CastVoteRequest>,
) -> ApiResult<VoteTally> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let voter = match require_viewer(&state, &viewer).await {
        Ok(profile) => profile,
        Err(e) => return error(e, revision_id),
    };

    match state.repo.cast_vote(&id, &voter.id, request.value).await {
        Ok(tally) => finish_vote(&state, tally, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/posts/:id/vote - Retract the viewer's vote.
pub async fn retract_vote(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> ApiResult<VoteTally> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let voter = match require_viewer(&state, &viewer).await {
        Ok(profile) => profile,
        Err(e) => return error(e, revision_id),
    };

    match state.repo.retract_vote(&id, &voter.id).await {
        Ok(tally) => finish_vote(&state, tally, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}

/// Push the post's new counters to subscribers and answer with the tally.
async fn finish_vote(state: &AppState, tally: VoteTally, revision_id: i64) -> ApiResult<VoteTally> {
    let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);

    match state.repo.get_post(&tally.post_id, None).await {
        Ok(Some(post)) => {
            state
                .realtime
                .publish(new_revision, Table::Posts, ChangeKind::Update, &post)
        }
        Ok(None) => tracing::warn!("Post {} missing after vote", tally.post_id),
        Err(e) => tracing::warn!("Failed to load post {} for push: {}", tally.post_id, e),
    }

    success(tally, new_revision)
}

//! Comment API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, require_viewer, success, ApiResult};
use crate::auth::Viewer;
use crate::errors::AppError;
use crate::models::{ChangeKind, Comment, CreateCommentRequest, Table};
use crate::AppState;

/// GET /api/posts/:id/comments - List a post's comments, oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Vec<Comment>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_comments(&post_id).await {
        Ok(comments) => success(comments, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/posts/:id/comments - Append a comment as the viewer.
pub async fn create_comment(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<Comment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let author = match require_viewer(&state, &viewer).await {
        Ok(profile) => profile,
        Err(e) => return error(e, revision_id),
    };

    if request.content.trim().is_empty() {
        return error(
            AppError::Validation("Comment content is required".to_string()),
            revision_id,
        );
    }

    match state
        .repo
        .create_comment(&post_id, &author.id, &request.content)
        .await
    {
        Ok(comment) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .realtime
                .publish(new_revision, Table::Comments, ChangeKind::Insert, &comment);
            success(comment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

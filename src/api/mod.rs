//! REST API module.
//!
//! Contains all API routes and handlers for the Campus Pulse feed.

mod comments;
mod mess;
mod posts;
mod profiles;
mod realtime;

pub use comments::*;
pub use mess::*;
pub use posts::*;
pub use profiles::*;
pub use realtime::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::Viewer;
use crate::errors::AppError;
use crate::models::Profile;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Resolve the viewer to a known profile, or fail as unauthenticated.
pub async fn require_viewer(state: &AppState, viewer: &Viewer) -> Result<Profile, AppError> {
    let Some(id) = viewer.id() else {
        return Err(AppError::Unauthorized(
            "You must be logged in to do that".to_string(),
        ));
    };

    state
        .repo
        .get_profile(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown profile {}", id)))
}

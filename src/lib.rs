//! Campus Pulse
//!
//! The feed service (REST over SQLite plus a server-sent-events change channel) and
//! the client library whose views fetch, filter, sort, vote on and merge realtime
//! updates into the Campus Pulse feed.

pub mod api;
pub mod attendance;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod realtime;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;
use realtime::ChangeHub;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub realtime: Arc<ChangeHub>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Profiles
        .route("/profiles", post(api::create_profile))
        .route("/profiles/{id}", get(api::get_profile))
        // Communities
        .route("/communities", get(api::list_communities).post(api::create_community))
        // Posts
        .route("/posts", get(api::list_posts).post(api::create_post))
        .route("/posts/{id}", get(api::get_post))
        .route("/posts/{id}/vote", put(api::cast_vote).delete(api::retract_vote))
        // Comments
        .route(
            "/posts/{id}/comments",
            get(api::list_comments).post(api::create_comment),
        )
        // Mess ratings
        .route("/mess/today", get(api::mess_today).post(api::rate_mess))
        // Realtime
        .route("/realtime", get(api::subscribe))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

//! Feed client library.
//!
//! Views hold a transient, re-fetchable copy of server state and talk to the
//! feed service through [`PulseBackend`]. The backend is constructed once at
//! startup and shared with every view through an `Arc`.

mod comments;
mod composer;
mod fake;
mod feed;
mod http;
pub mod search;
pub mod vote;

pub use comments::*;
pub use composer::*;
pub use fake::*;
pub use feed::*;
pub use http::*;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{
    ChangeEvent, Comment, Community, CreateCommunityRequest, CreatePostRequest,
    CreateProfileRequest, FeedQuery, Post, Profile, Table, VoteTally, VoteValue,
};

/// Client-side error type.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The action needs a logged-in viewer
    Unauthenticated,
    /// Rejected locally before any network call
    Validation(String),
    /// The service answered with an error envelope
    Api {
        status: u16,
        code: String,
        message: String,
    },
    /// Network failure or unreadable response
    Transport(String),
    /// Response body did not match the expected shape
    Decode(String),
    /// The realtime channel ended
    SubscriptionClosed,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Unauthenticated => write!(f, "not authenticated"),
            ClientError::Validation(msg) => write!(f, "validation failed: {}", msg),
            ClientError::Api {
                status,
                code,
                message,
            } => write!(f, "{} {}: {}", status, code, message),
            ClientError::Transport(msg) => write!(f, "transport error: {}", msg),
            ClientError::Decode(msg) => write!(f, "decode error: {}", msg),
            ClientError::SubscriptionClosed => write!(f, "realtime subscription closed"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A toast-style notification raised by a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// A live realtime subscription. Dropping it tears the channel down.
pub struct Subscription {
    table: Table,
    events: mpsc::Receiver<ChangeEvent>,
    reader: JoinHandle<()>,
}

impl Subscription {
    pub fn new(table: Table, events: mpsc::Receiver<ChangeEvent>, reader: JoinHandle<()>) -> Self {
        Self {
            table,
            events,
            reader,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Wait for the next change; `None` once the channel has ended.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Take a change that has already arrived, without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reader.abort();
        tracing::debug!("Realtime subscription on {} released", self.table.as_str());
    }
}

/// Typed access to the feed service's tables and change feed.
#[async_trait]
pub trait PulseBackend: Send + Sync {
    async fn create_profile(&self, request: &CreateProfileRequest) -> Result<Profile, ClientError>;

    async fn list_communities(&self) -> Result<Vec<Community>, ClientError>;

    async fn create_community(
        &self,
        request: &CreateCommunityRequest,
    ) -> Result<Community, ClientError>;

    /// Feed query; `viewer` decorates each post with the viewer's own vote.
    async fn list_posts(
        &self,
        query: &FeedQuery,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, ClientError>;

    async fn create_post(
        &self,
        viewer: &str,
        request: &CreatePostRequest,
    ) -> Result<Post, ClientError>;

    /// Insert or replace the viewer's vote.
    async fn cast_vote(
        &self,
        viewer: &str,
        post_id: &str,
        value: VoteValue,
    ) -> Result<VoteTally, ClientError>;

    /// Delete the viewer's vote.
    async fn retract_vote(&self, viewer: &str, post_id: &str) -> Result<VoteTally, ClientError>;

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError>;

    async fn create_comment(
        &self,
        viewer: &str,
        post_id: &str,
        content: &str,
    ) -> Result<Comment, ClientError>;

    /// Open a change feed for one table.
    async fn subscribe(&self, table: Table) -> Result<Subscription, ClientError>;
}

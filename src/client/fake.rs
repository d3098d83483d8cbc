//! In-memory backend for exercising views without a running service.
//!
//! Mirrors the service's validation, identity checks and change pushes, and counts
//! calls so tests can assert that a rejected action never reached the backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use uuid::Uuid;

use super::{ClientError, PulseBackend, Subscription};
use crate::errors::codes;
use crate::models::{
    AuthorSummary, ChangeEvent, ChangeKind, Comment, Community, CreateCommunityRequest,
    CreatePostRequest, CreateProfileRequest, FeedQuery, Post, Profile, Table, VoteTally,
    VoteValue, PAGE_SIZE,
};

#[derive(Default)]
struct FakeTables {
    profiles: Vec<Profile>,
    communities: Vec<Community>,
    posts: Vec<Post>,
    votes: HashMap<(String, String), VoteValue>,
    comments: Vec<Comment>,
    revision: i64,
    ticks: i64,
}

impl FakeTables {
    /// Deterministic clock: every write lands one second after the previous one.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        let epoch = Utc
            .with_ymd_and_hms(2024, 9, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        epoch + Duration::seconds(self.ticks)
    }

    fn bump(&mut self) -> i64 {
        self.revision += 1;
        self.revision
    }

    fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    fn require_profile(&self, id: &str) -> Result<Profile, ClientError> {
        self.profile(id)
            .cloned()
            .ok_or_else(|| api_error(401, codes::UNAUTHORIZED, "Sign in required"))
    }

    fn post_index(&self, id: &str) -> Result<usize, ClientError> {
        self.posts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| api_error(404, codes::NOT_FOUND, &format!("Post {} not found", id)))
    }

    fn recount(&mut self, index: usize) {
        let post_id = self.posts[index].id.clone();
        let (mut up, mut down) = (0, 0);
        for ((post, _), value) in &self.votes {
            if *post == post_id {
                match value {
                    VoteValue::Up => up += 1,
                    VoteValue::Down => down += 1,
                }
            }
        }
        self.posts[index].upvotes = up;
        self.posts[index].downvotes = down;
    }

    /// A stored post as `viewer` sees it.
    fn present(&self, post: &Post, viewer: Option<&str>) -> Post {
        let mut shown = post.clone();
        if shown.is_anonymous {
            shown.author_id = None;
            shown.author = None;
        }
        shown.community_name = self
            .communities
            .iter()
            .find(|c| c.id == post.community_id)
            .map(|c| c.name.clone());
        shown.my_vote = viewer.and_then(|v| self.votes.get(&(post.id.clone(), v.to_string())).copied());
        shown
    }

    fn tally(&self, index: usize, viewer: &str) -> VoteTally {
        let post = &self.posts[index];
        VoteTally {
            post_id: post.id.clone(),
            upvotes: post.upvotes,
            downvotes: post.downvotes,
            my_vote: self.votes.get(&(post.id.clone(), viewer.to_string())).copied(),
        }
    }
}

fn api_error(status: u16, code: &str, message: &str) -> ClientError {
    ClientError::Api {
        status,
        code: code.to_string(),
        message: message.to_string(),
    }
}

fn validation(message: &str) -> ClientError {
    api_error(400, codes::VALIDATION_ERROR, message)
}

/// In-memory stand-in for the feed service.
pub struct FakeBackend {
    tables: Mutex<FakeTables>,
    changes: broadcast::Sender<ChangeEvent>,
    read_calls: AtomicU64,
    write_calls: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            tables: Mutex::new(FakeTables::default()),
            changes,
            read_calls: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every later write fail as if the service were down.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// The stored vote of `user` on `post`.
    pub async fn stored_vote(&self, post_id: &str, user_id: &str) -> Option<VoteValue> {
        let tables = self.tables.lock().await;
        tables
            .votes
            .get(&(post_id.to_string(), user_id.to_string()))
            .copied()
    }

    /// Number of vote rows stored for `post`.
    pub async fn vote_rows(&self, post_id: &str) -> usize {
        let tables = self.tables.lock().await;
        tables.votes.keys().filter(|(post, _)| post == post_id).count()
    }

    fn begin_read(&self) -> Result<(), ClientError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn begin_write(&self) -> Result<(), ClientError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn publish<T: Serialize>(&self, revision: i64, table: Table, kind: ChangeKind, record: &T) {
        let record = match serde_json::to_value(record) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to serialize fake change: {}", e);
                return;
            }
        };
        let _ = self.changes.send(ChangeEvent {
            revision,
            table,
            kind,
            record,
        });
    }

    async fn write_vote(
        &self,
        viewer: &str,
        post_id: &str,
        value: Option<VoteValue>,
    ) -> Result<VoteTally, ClientError> {
        self.begin_write()?;
        let mut tables = self.tables.lock().await;
        tables.require_profile(viewer)?;
        let index = tables.post_index(post_id)?;

        let key = (post_id.to_string(), viewer.to_string());
        match value {
            Some(value) => {
                tables.votes.insert(key, value);
            }
            None => {
                tables.votes.remove(&key);
            }
        }
        tables.recount(index);
        let revision = tables.bump();
        let pushed = tables.present(&tables.posts[index], None);
        let tally = tables.tally(index, viewer);
        drop(tables);

        self.publish(revision, Table::Posts, ChangeKind::Update, &pushed);
        Ok(tally)
    }
}

#[async_trait]
impl PulseBackend for FakeBackend {
    async fn create_profile(&self, request: &CreateProfileRequest) -> Result<Profile, ClientError> {
        self.begin_write()?;
        let username = request.username.trim();
        if username.is_empty() {
            return Err(validation("Username is required"));
        }
        let mut tables = self.tables.lock().await;
        if tables.profiles.iter().any(|p| p.username == username) {
            return Err(api_error(409, codes::CONFLICT, "Username already taken"));
        }
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            avatar_url: request.avatar_url.clone(),
            created_at: tables.now(),
        };
        tables.profiles.push(profile.clone());
        tables.bump();
        Ok(profile)
    }

    async fn list_communities(&self) -> Result<Vec<Community>, ClientError> {
        self.begin_read()?;
        let tables = self.tables.lock().await;
        let mut communities = tables.communities.clone();
        communities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(communities)
    }

    async fn create_community(
        &self,
        request: &CreateCommunityRequest,
    ) -> Result<Community, ClientError> {
        self.begin_write()?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(validation("Community name is required"));
        }
        let mut tables = self.tables.lock().await;
        if tables.communities.iter().any(|c| c.name == name) {
            return Err(api_error(409, codes::CONFLICT, "Community already exists"));
        }
        let community = Community {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        tables.communities.push(community.clone());
        let revision = tables.bump();
        drop(tables);

        self.publish(revision, Table::Communities, ChangeKind::Insert, &community);
        Ok(community)
    }

    async fn list_posts(
        &self,
        query: &FeedQuery,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, ClientError> {
        self.begin_read()?;
        let tables = self.tables.lock().await;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| query.matches(p))
            .map(|p| tables.present(p, viewer))
            .collect();
        posts.sort_by(|a, b| query.sort.compare(a, b));
        posts.truncate(PAGE_SIZE as usize);
        Ok(posts)
    }

    async fn create_post(
        &self,
        viewer: &str,
        request: &CreatePostRequest,
    ) -> Result<Post, ClientError> {
        self.begin_write()?;
        let mut tables = self.tables.lock().await;
        let author = tables.require_profile(viewer)?;

        if request.title.trim().is_empty() {
            return Err(validation("Title is required"));
        }
        if request.content.trim().is_empty() {
            return Err(validation("Content is required"));
        }
        if !tables.communities.iter().any(|c| c.id == request.community_id) {
            return Err(api_error(
                404,
                codes::NOT_FOUND,
                &format!("Community {} not found", request.community_id),
            ));
        }

        let post = Post {
            id: Uuid::new_v4().to_string(),
            title: request.title.trim().to_string(),
            content: request.content.trim().to_string(),
            community_id: request.community_id.clone(),
            community_name: None,
            author_id: Some(author.id.clone()),
            author: Some(AuthorSummary {
                username: author.username.clone(),
                avatar_url: author.avatar_url.clone(),
            }),
            is_anonymous: request.is_anonymous,
            created_at: tables.now(),
            upvotes: 0,
            downvotes: 0,
            my_vote: None,
        };
        tables.posts.push(post.clone());
        let revision = tables.bump();
        let created = tables.present(&post, Some(viewer));
        let pushed = tables.present(&post, None);
        drop(tables);

        self.publish(revision, Table::Posts, ChangeKind::Insert, &pushed);
        Ok(created)
    }

    async fn cast_vote(
        &self,
        viewer: &str,
        post_id: &str,
        value: VoteValue,
    ) -> Result<VoteTally, ClientError> {
        self.write_vote(viewer, post_id, Some(value)).await
    }

    async fn retract_vote(&self, viewer: &str, post_id: &str) -> Result<VoteTally, ClientError> {
        self.write_vote(viewer, post_id, None).await
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError> {
        self.begin_read()?;
        let tables = self.tables.lock().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        viewer: &str,
        post_id: &str,
        content: &str,
    ) -> Result<Comment, ClientError> {
        self.begin_write()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(validation("Comment cannot be empty"));
        }
        let mut tables = self.tables.lock().await;
        let author = tables.require_profile(viewer)?;
        let index = tables.post_index(post_id)?;
        let is_op = tables.posts[index].author_id.as_deref() == Some(author.id.as_str());
        let hidden = is_op && tables.posts[index].is_anonymous;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author_id: (!hidden).then(|| author.id.clone()),
            author: (!hidden).then(|| AuthorSummary {
                username: author.username,
                avatar_url: author.avatar_url,
            }),
            content: content.to_string(),
            created_at: tables.now(),
            is_op,
        };
        tables.comments.push(comment.clone());
        let revision = tables.bump();
        drop(tables);

        self.publish(revision, Table::Comments, ChangeKind::Insert, &comment);
        Ok(comment)
    }

    async fn subscribe(&self, table: Table) -> Result<Subscription, ClientError> {
        let mut changes = BroadcastStream::new(self.changes.subscribe());
        let (sender, receiver) = mpsc::channel(64);

        let reader = tokio::spawn(async move {
            while let Some(item) = changes.next().await {
                match item {
                    Ok(event) if event.table == table => {
                        if sender.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!("Fake subscriber lagged by {} changes", skipped);
                    }
                }
            }
        });

        Ok(Subscription::new(table, receiver, reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_and_validation_mirror_service() {
        let backend = FakeBackend::new();
        let err = backend
            .create_post(
                "nobody",
                &CreatePostRequest {
                    title: "t".to_string(),
                    content: "c".to_string(),
                    community_id: "c".to_string(),
                    is_anonymous: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 401, .. }));

        let profile = backend
            .create_profile(&CreateProfileRequest {
                username: "arun".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        let err = backend
            .create_post(
                &profile.id,
                &CreatePostRequest {
                    title: "t".to_string(),
                    content: "c".to_string(),
                    community_id: "missing".to_string(),
                    is_anonymous: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));

        let err = backend
            .create_profile(&CreateProfileRequest {
                username: "arun".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_anonymous_post_hides_author() {
        let backend = FakeBackend::new();
        let profile = backend
            .create_profile(&CreateProfileRequest {
                username: "quiet".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        let community = backend
            .create_community(&CreateCommunityRequest {
                name: "Confessions".to_string(),
            })
            .await
            .unwrap();
        backend
            .create_post(
                &profile.id,
                &CreatePostRequest {
                    title: "Secret".to_string(),
                    content: "Shh".to_string(),
                    community_id: community.id,
                    is_anonymous: true,
                },
            )
            .await
            .unwrap();

        let posts = backend.list_posts(&FeedQuery::default(), None).await.unwrap();
        assert!(posts[0].author.is_none());
        assert!(posts[0].author_id.is_none());
        assert_eq!(posts[0].community_name.as_deref(), Some("Confessions"));
    }

    #[tokio::test]
    async fn test_anonymous_op_comment_hides_author() {
        let backend = FakeBackend::new();
        let op = backend
            .create_profile(&CreateProfileRequest {
                username: "secret_op".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        let community = backend
            .create_community(&CreateCommunityRequest {
                name: "Confessions".to_string(),
            })
            .await
            .unwrap();
        let post = backend
            .create_post(
                &op.id,
                &CreatePostRequest {
                    title: "Secret".to_string(),
                    content: "Shh".to_string(),
                    community_id: community.id,
                    is_anonymous: true,
                },
            )
            .await
            .unwrap();

        backend
            .create_comment(&op.id, &post.id, "Still me")
            .await
            .unwrap();
        let comments = backend.list_comments(&post.id).await.unwrap();
        assert!(comments[0].is_op);
        assert!(comments[0].author_id.is_none());
        assert!(comments[0].author.is_none());
    }

    #[tokio::test]
    async fn test_failed_reads_are_counted() {
        let backend = FakeBackend::new();
        backend.set_fail_reads(true);
        assert!(backend.list_communities().await.is_err());
        assert_eq!(backend.read_calls(), 1);
        assert_eq!(backend.write_calls(), 0);
    }
}

//! Comment thread under a post.

use std::sync::Arc;

use super::{Notice, PulseBackend};
use crate::models::{Comment, Profile};

/// Comments for one post plus the reply box.
pub struct CommentThread<B: PulseBackend + ?Sized> {
    backend: Arc<B>,
    post_id: String,
    comments: Vec<Comment>,
    pub input: String,
    notices: Vec<Notice>,
}

impl<B: PulseBackend + ?Sized> CommentThread<B> {
    pub fn new(backend: Arc<B>, post_id: impl Into<String>) -> Self {
        Self {
            backend,
            post_id: post_id.into(),
            comments: Vec::new(),
            input: String::new(),
            notices: Vec::new(),
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    /// Comments oldest first.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Fetch the thread. A failed fetch keeps whatever was shown before.
    pub async fn load(&mut self) {
        match self.backend.list_comments(&self.post_id).await {
            Ok(comments) => self.comments = comments,
            Err(e) => {
                tracing::warn!("Failed to load comments for {}: {}", self.post_id, e);
                self.notices.push(Notice::error("Failed to load comments"));
            }
        }
    }

    /// Post the reply box as `viewer`. Returns whether a comment was written.
    pub async fn submit(&mut self, viewer: Option<&Profile>) -> bool {
        let content = self.input.trim().to_string();
        if content.is_empty() {
            return false;
        }
        let Some(viewer) = viewer else {
            self.notices.push(Notice::error("Please log in to comment"));
            return false;
        };

        match self
            .backend
            .create_comment(&viewer.id, &self.post_id, &content)
            .await
        {
            Ok(comment) => {
                tracing::debug!("Comment {} added to {}", comment.id, self.post_id);
                self.input.clear();
                self.load().await;
                if !self.comments.iter().any(|c| c.id == comment.id) {
                    self.comments.push(comment);
                }
                self.notices.push(Notice::success("Comment added!"));
                true
            }
            Err(e) => {
                tracing::warn!("Failed to post comment on {}: {}", self.post_id, e);
                self.notices.push(Notice::error("Failed to post"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FakeBackend, NoticeLevel};
    use crate::models::{CreateCommunityRequest, CreatePostRequest, CreateProfileRequest};

    async fn thread() -> (Arc<FakeBackend>, Profile, Profile, String) {
        let backend = Arc::new(FakeBackend::new());
        let op = backend
            .create_profile(&CreateProfileRequest {
                username: "op".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        let other = backend
            .create_profile(&CreateProfileRequest {
                username: "reader".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        let community = backend
            .create_community(&CreateCommunityRequest {
                name: "General".to_string(),
            })
            .await
            .unwrap();
        let post = backend
            .create_post(
                &op.id,
                &CreatePostRequest {
                    title: "Question".to_string(),
                    content: "Where is the printer?".to_string(),
                    community_id: community.id,
                    is_anonymous: false,
                },
            )
            .await
            .unwrap();
        (backend, op, other, post.id)
    }

    #[tokio::test]
    async fn test_submit_adds_one_entry() {
        let (backend, _op, reader, post_id) = thread().await;
        let mut thread = CommentThread::new(backend, post_id);
        thread.load().await;
        assert!(thread.comments().is_empty());

        thread.input = "hello".to_string();
        assert!(thread.submit(Some(&reader)).await);

        assert_eq!(thread.comments().len(), 1);
        assert_eq!(thread.comments()[0].content, "hello");
        assert!(!thread.comments()[0].is_op);
        assert!(thread.input.is_empty());
        assert_eq!(thread.take_notices(), vec![Notice::success("Comment added!")]);
    }

    #[tokio::test]
    async fn test_op_flag_and_order() {
        let (backend, op, reader, post_id) = thread().await;
        let mut thread = CommentThread::new(backend, post_id);

        thread.input = "first".to_string();
        thread.submit(Some(&reader)).await;
        thread.input = "second".to_string();
        thread.submit(Some(&op)).await;

        let contents: Vec<&str> = thread.comments().iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(thread.comments()[1].is_op);
    }

    #[tokio::test]
    async fn test_blank_input_is_silent() {
        let (backend, _op, reader, post_id) = thread().await;
        let writes = backend.write_calls();
        let mut thread = CommentThread::new(backend.clone(), post_id);

        thread.input = "   ".to_string();
        assert!(!thread.submit(Some(&reader)).await);
        assert!(thread.take_notices().is_empty());
        assert_eq!(backend.write_calls(), writes);
    }

    #[tokio::test]
    async fn test_requires_viewer() {
        let (backend, _op, _reader, post_id) = thread().await;
        let mut thread = CommentThread::new(backend, post_id);
        thread.input = "hi".to_string();
        assert!(!thread.submit(None).await);
        assert_eq!(thread.input, "hi");
        assert_eq!(thread.take_notices()[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_input() {
        let (backend, _op, reader, post_id) = thread().await;
        backend.set_fail_writes(true);
        let mut thread = CommentThread::new(backend, post_id);
        thread.input = "hi".to_string();
        assert!(!thread.submit(Some(&reader)).await);
        assert_eq!(thread.input, "hi");
        assert_eq!(thread.take_notices(), vec![Notice::error("Failed to post")]);
    }
}

//! Feed state and the feed view.
//!
//! [`FeedState`] is the single reducer for everything that changes the rendered
//! list: fetch results, realtime pushes and optimistic votes. Every path merges by
//! post id, so a post fetched and pushed at the same time shows up once.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::search::SearchRequest;
use super::vote::{PendingVote, VotePhase};
use super::{ClientError, Notice, PostComposer, PulseBackend, Subscription};
use crate::models::{
    ChangeEvent, ChangeKind, Community, FeedQuery, Post, Profile, SortMode, Table, VoteTally,
    VoteValue,
};

/// A fetch issued by the feed state; its generation decides whether the answer still counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub query: FeedQuery,
}

/// Everything that can change the feed.
#[derive(Debug, Clone)]
pub enum FeedAction {
    Loaded { generation: u64, posts: Vec<Post> },
    LoadFailed { generation: u64 },
    Upserted { post: Post, revision: i64 },
    Removed(String),
    VoteStarted(PendingVote),
    VoteCommitted(VoteTally),
    VoteReverted { post_id: String },
}

impl FeedAction {
    /// Map a realtime change on the posts table to a feed action.
    pub fn from_change(event: ChangeEvent) -> Option<Self> {
        if event.table != Table::Posts {
            return None;
        }
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                match serde_json::from_value::<Post>(event.record) {
                    Ok(post) => Some(FeedAction::Upserted {
                        post,
                        revision: event.revision,
                    }),
                    Err(e) => {
                        tracing::warn!("Dropping malformed post change: {}", e);
                        None
                    }
                }
            }
            ChangeKind::Delete => event
                .record
                .get("id")
                .and_then(|id| id.as_str())
                .map(|id| FeedAction::Removed(id.to_string())),
        }
    }
}

/// The rendered feed plus the bookkeeping needed to merge into it.
#[derive(Debug, Default)]
pub struct FeedState {
    query: FeedQuery,
    posts: Vec<Post>,
    issued: u64,
    pending: HashMap<String, PendingVote>,
    /// Last pushed revision merged per post id.
    revisions: HashMap<String, i64>,
}

impl FeedState {
    pub fn new(query: FeedQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    pub fn pending_vote(&self, post_id: &str) -> Option<&PendingVote> {
        self.pending.get(post_id)
    }

    /// Change the filter. The caller is expected to fetch again.
    pub fn set_query(&mut self, query: FeedQuery) {
        self.query = query;
    }

    /// Issue a new fetch generation; older generations become stale.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket {
            generation: self.issued,
            query: self.query.clone(),
        }
    }

    /// Apply an action; returns whether the rendered feed changed.
    pub fn apply(&mut self, action: FeedAction) -> bool {
        match action {
            FeedAction::Loaded { generation, posts } => {
                if generation != self.issued {
                    tracing::debug!(
                        "Discarding stale feed generation {} (latest {})",
                        generation,
                        self.issued
                    );
                    return false;
                }
                self.replace_all(posts);
                true
            }
            FeedAction::LoadFailed { generation } => {
                if generation != self.issued {
                    return false;
                }
                self.posts.clear();
                true
            }
            FeedAction::Upserted { post, revision } => self.upsert(post, revision),
            FeedAction::Removed(id) => {
                self.pending.remove(&id);
                self.revisions.remove(&id);
                let before = self.posts.len();
                self.posts.retain(|p| p.id != id);
                self.posts.len() != before
            }
            FeedAction::VoteStarted(pending) => {
                let Some(post) = self.posts.iter_mut().find(|p| p.id == pending.post_id) else {
                    return false;
                };
                pending.apply(post);
                let id = pending.post_id.clone();
                self.pending.insert(id.clone(), pending);
                self.reposition(&id);
                true
            }
            FeedAction::VoteCommitted(tally) => {
                self.pending.remove(&tally.post_id);
                let Some(post) = self.posts.iter_mut().find(|p| p.id == tally.post_id) else {
                    return false;
                };
                post.upvotes = tally.upvotes;
                post.downvotes = tally.downvotes;
                post.my_vote = tally.my_vote;
                self.reposition(&tally.post_id);
                true
            }
            FeedAction::VoteReverted { post_id } => {
                let Some(pending) = self.pending.remove(&post_id) else {
                    return false;
                };
                let Some(post) = self.posts.iter_mut().find(|p| p.id == post_id) else {
                    return false;
                };
                pending.revert(post);
                self.reposition(&post_id);
                true
            }
        }
    }

    /// Replace the list with a fetch result, keeping optimistic votes in place.
    fn replace_all(&mut self, incoming: Vec<Post>) {
        let mut seen = HashSet::new();
        let mut posts = Vec::with_capacity(incoming.len());

        for mut post in incoming {
            if !seen.insert(post.id.clone()) {
                continue;
            }
            if let Some(pending) = self.pending.get(&post.id) {
                // The fetched row reflects the server's view of our vote, committed or not.
                post.apply_vote_change(post.my_vote, pending.next);
            }
            posts.push(post);
        }

        let kept: HashSet<&String> = posts.iter().map(|p| &p.id).collect();
        self.pending.retain(|id, _| kept.contains(id));
        self.revisions.retain(|id, _| kept.contains(id));
        self.posts = posts;
    }

    fn upsert(&mut self, mut post: Post, revision: i64) -> bool {
        if let Some(&seen) = self.revisions.get(&post.id) {
            if revision <= seen {
                tracing::debug!(
                    "Skipping post {} at revision {} (have {})",
                    post.id,
                    revision,
                    seen
                );
                return false;
            }
        }

        if let Some(existing) = self.posts.iter_mut().find(|p| p.id == post.id) {
            // Pushed rows are viewer-agnostic; our own vote stays local.
            post.my_vote = existing.my_vote;
            if self.pending.contains_key(&post.id) {
                post.upvotes = existing.upvotes;
                post.downvotes = existing.downvotes;
            }
            let id = post.id.clone();
            *existing = post;
            self.revisions.insert(id.clone(), revision);
            self.reposition(&id);
            return true;
        }

        if !self.query.matches(&post) {
            return false;
        }

        self.revisions.insert(post.id.clone(), revision);
        self.insert_sorted(post);
        true
    }

    /// Move a row whose counters changed back to its sorted position.
    fn reposition(&mut self, id: &str) {
        let Some(index) = self.posts.iter().position(|p| p.id == id) else {
            return;
        };
        let post = self.posts.remove(index);
        self.insert_sorted(post);
    }

    fn insert_sorted(&mut self, post: Post) {
        let sort = self.query.sort;
        let index = self
            .posts
            .iter()
            .position(|p| sort.compare(&post, p) == Ordering::Less)
            .unwrap_or(self.posts.len());
        self.posts.insert(index, post);
    }
}

/// The Campus Pulse feed screen: filter controls, list, votes, composer and realtime.
pub struct FeedView<B: PulseBackend + ?Sized> {
    backend: Arc<B>,
    viewer: Option<Profile>,
    state: FeedState,
    subscription: Option<Subscription>,
    last_search: u64,
    notices: Vec<Notice>,
}

impl<B: PulseBackend + ?Sized> FeedView<B> {
    pub fn new(backend: Arc<B>, viewer: Option<Profile>) -> Self {
        Self {
            backend,
            viewer,
            state: FeedState::default(),
            subscription: None,
            last_search: 0,
            notices: Vec::new(),
        }
    }

    pub fn posts(&self) -> &[Post] {
        self.state.posts()
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn viewer(&self) -> Option<&Profile> {
        self.viewer.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Drain the notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Open the posts change feed, then load the first page.
    ///
    /// Subscribing first means nothing inserted between the two calls is missed;
    /// any overlap is absorbed by the merge-by-id.
    pub async fn mount(&mut self) {
        match self.backend.subscribe(Table::Posts).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                tracing::warn!("Realtime subscription failed: {}", e);
                self.notices
                    .push(Notice::error("Live updates are unavailable right now"));
            }
        }
        self.refresh().await;
    }

    /// Release the realtime subscription.
    pub fn unmount(&mut self) {
        self.subscription = None;
    }

    /// Re-query the feed with the current filter.
    pub async fn refresh(&mut self) {
        let ticket = self.state.begin_fetch();
        let viewer = self.viewer.as_ref().map(|p| p.id.clone());
        let result = self
            .backend
            .list_posts(&ticket.query, viewer.as_deref())
            .await;
        self.finish_fetch(&ticket, result);
    }

    /// Apply the answer to a fetch; stale generations are ignored.
    pub fn finish_fetch(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<Post>, ClientError>,
    ) -> bool {
        match result {
            Ok(posts) => {
                tracing::debug!(
                    "Feed generation {} returned {} posts",
                    ticket.generation,
                    posts.len()
                );
                self.state.apply(FeedAction::Loaded {
                    generation: ticket.generation,
                    posts,
                })
            }
            Err(e) => {
                tracing::warn!("Feed query failed: {}", e);
                let changed = self.state.apply(FeedAction::LoadFailed {
                    generation: ticket.generation,
                });
                if changed {
                    self.notices.push(Notice::error("Failed to load posts"));
                }
                changed
            }
        }
    }

    pub async fn set_sort(&mut self, sort: SortMode) {
        let query = FeedQuery {
            sort,
            ..self.state.query().clone()
        };
        self.state.set_query(query);
        self.refresh().await;
    }

    pub async fn set_community(&mut self, community: Option<String>) {
        let query = FeedQuery {
            community,
            ..self.state.query().clone()
        };
        self.state.set_query(query);
        self.refresh().await;
    }

    /// Apply a settled search from the debouncer. Out-of-order requests are ignored.
    pub async fn apply_search(&mut self, request: SearchRequest) {
        if request.generation <= self.last_search {
            return;
        }
        self.last_search = request.generation;
        let text = request.text.trim();
        let query = FeedQuery {
            q: (!text.is_empty()).then(|| text.to_string()),
            ..self.state.query().clone()
        };
        self.state.set_query(query);
        self.refresh().await;
    }

    /// Communities for the sidebar and composer.
    pub async fn load_communities(&mut self) -> Vec<Community> {
        match self.backend.list_communities().await {
            Ok(communities) => communities,
            Err(e) => {
                tracing::warn!("Failed to load communities: {}", e);
                self.notices.push(Notice::error("Failed to load communities"));
                Vec::new()
            }
        }
    }

    /// Vote on a post, optimistically.
    ///
    /// Returns `None` when no vote was attempted (no viewer, unknown post).
    pub async fn vote(&mut self, post_id: &str, requested: VoteValue) -> Option<VotePhase> {
        let Some(viewer) = self.viewer.as_ref().map(|p| p.id.clone()) else {
            self.notices.push(Notice::error("Please log in to vote"));
            return None;
        };
        if self.state.pending_vote(post_id).is_some() {
            return Some(VotePhase::Pending);
        }
        let post = self.state.post(post_id)?;

        let pending = PendingVote::begin(post, requested);
        let next = pending.next;
        self.state.apply(FeedAction::VoteStarted(pending));

        let result = match next {
            Some(value) => self.backend.cast_vote(&viewer, post_id, value).await,
            None => self.backend.retract_vote(&viewer, post_id).await,
        };

        match result {
            Ok(tally) => {
                self.state.apply(FeedAction::VoteCommitted(tally));
                Some(VotePhase::Committed)
            }
            Err(e) => {
                tracing::warn!("Vote on {} failed, reverting: {}", post_id, e);
                self.state.apply(FeedAction::VoteReverted {
                    post_id: post_id.to_string(),
                });
                self.notices.push(Notice::error("Failed to save your vote"));
                Some(VotePhase::Reverted)
            }
        }
    }

    /// Submit the composer's draft. On success the composer is reset and the feed re-fetched.
    pub async fn submit_post(&mut self, composer: &mut PostComposer) -> bool {
        let Some(viewer) = self.viewer.as_ref().map(|p| p.id.clone()) else {
            self.notices
                .push(Notice::error("You must be logged in to post!"));
            return false;
        };

        let request = match composer.validate() {
            Ok(request) => request,
            Err(e) => {
                self.notices.push(Notice::error(e.to_string()));
                return false;
            }
        };

        match self.backend.create_post(&viewer, &request).await {
            Ok(post) => {
                tracing::info!("Created post {}", post.id);
                composer.reset();
                self.notices.push(Notice::success("Post created"));
                self.refresh().await;
                true
            }
            Err(e) => {
                tracing::warn!("Create post failed: {}", e);
                self.notices.push(Notice::error("Failed to create post"));
                false
            }
        }
    }

    /// Apply a realtime change; returns whether the feed changed.
    pub fn apply_change(&mut self, event: ChangeEvent) -> bool {
        match FeedAction::from_change(event) {
            Some(action) => self.state.apply(action),
            None => false,
        }
    }

    /// Apply every change that has already arrived. Returns how many changed the feed.
    pub fn drain_changes(&mut self) -> usize {
        let mut events = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            while let Some(event) = subscription.try_next() {
                events.push(event);
            }
        }
        events
            .into_iter()
            .map(|event| self.apply_change(event))
            .filter(|changed| *changed)
            .count()
    }

    /// Wait for the next realtime change and apply it.
    ///
    /// Returns `None` when there is no subscription or it has ended.
    pub async fn next_change(&mut self) -> Option<bool> {
        let subscription = self.subscription.as_mut()?;
        match subscription.next().await {
            Some(event) => Some(self.apply_change(event)),
            None => {
                tracing::warn!("Realtime channel closed");
                self.subscription = None;
                None
            }
        }
    }
}

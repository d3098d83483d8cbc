//! Vote control: toggle rules and the optimistic three-state operation.
//!
//! A vote starts `Pending` with the displayed counters already adjusted. The write
//! then either commits (the server tally replaces the local counters) or reverts
//! (the vote's own delta is taken back out of whatever the counters show now).

use crate::models::{Post, VoteValue};

/// The viewer's vote after clicking `requested`. Repeating the current vote retracts it.
pub fn next_vote(current: Option<VoteValue>, requested: VoteValue) -> Option<VoteValue> {
    if current == Some(requested) {
        None
    } else {
        Some(requested)
    }
}

/// Lifecycle of one optimistic vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePhase {
    Pending,
    Committed,
    Reverted,
}

/// An in-flight vote: the viewer's vote before and after the click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    pub post_id: String,
    pub previous: Option<VoteValue>,
    pub next: Option<VoteValue>,
}

impl PendingVote {
    /// Work out the vote a click on `requested` leads to.
    pub fn begin(post: &Post, requested: VoteValue) -> Self {
        Self {
            post_id: post.id.clone(),
            previous: post.my_vote,
            next: next_vote(post.my_vote, requested),
        }
    }

    /// Adjust the displayed post ahead of the write.
    pub fn apply(&self, post: &mut Post) {
        post.apply_vote_change(post.my_vote, self.next);
    }

    /// Undo this vote's delta; counter changes from others made meanwhile stay.
    pub fn revert(&self, post: &mut Post) {
        post.apply_vote_change(self.next, self.previous);
    }
}

//! Vote model: one row per (post, user), value +1 or -1.

use serde::{Deserialize, Serialize};

/// A stored vote. Zero is never stored; retraction deletes the row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    /// Contribution of this vote to a post's score.
    pub fn weight(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(format!("vote value must be 1 or -1, got {}", other)),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(value: VoteValue) -> Self {
        value.weight()
    }
}

/// Score contribution of an optional vote; absent counts as zero.
pub fn vote_weight(vote: Option<VoteValue>) -> i64 {
    vote.map(VoteValue::weight).unwrap_or(0)
}

/// Request body for casting a vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub value: VoteValue,
}

/// Authoritative counters for a post after a vote write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub post_id: String,
    pub upvotes: i64,
    pub downvotes: i64,
    #[serde(default)]
    pub my_vote: Option<VoteValue>,
}

impl VoteTally {
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

//! Post model and feed query parameters.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{vote_weight, AuthorSummary, VoteValue};

/// Backend default page size for feed queries.
pub const PAGE_SIZE: i64 = 50;

/// A Campus Pulse post, decorated with author display fields and the viewer's vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub community_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_name: Option<String>,
    /// Hidden for anonymous posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSummary>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_vote: Option<VoteValue>,
}

impl Post {
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    /// Swap one of the viewer's votes for another, keeping the counters in step.
    pub fn apply_vote_change(&mut self, previous: Option<VoteValue>, next: Option<VoteValue>) {
        match previous {
            Some(VoteValue::Up) => self.upvotes -= 1,
            Some(VoteValue::Down) => self.downvotes -= 1,
            None => {}
        }
        match next {
            Some(VoteValue::Up) => self.upvotes += 1,
            Some(VoteValue::Down) => self.downvotes += 1,
            None => {}
        }
        self.my_vote = next;
    }

    /// Expected score after replacing `previous` with `next`.
    pub fn projected_score(&self, previous: Option<VoteValue>, next: Option<VoteValue>) -> i64 {
        self.score() - vote_weight(previous) + vote_weight(next)
    }
}

/// Feed ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    New,
    Top,
    /// Ranked by raw score like `Top`; there is no time decay.
    Hot,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::New => "new",
            SortMode::Top => "top",
            SortMode::Hot => "hot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(SortMode::New),
            "top" => Some(SortMode::Top),
            "hot" => Some(SortMode::Hot),
            _ => None,
        }
    }

    /// Order two posts for this mode; `Less` means `a` is shown first.
    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        let newest_first = b.created_at.cmp(&a.created_at);
        match self {
            SortMode::New => newest_first,
            SortMode::Top | SortMode::Hot => b.score().cmp(&a.score()).then(newest_first),
        }
    }
}

/// Feed filter state: sort mode, optional community, optional title search.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FeedQuery {
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl FeedQuery {
    /// Trimmed search text, or `None` when blank.
    pub fn search_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Whether `post` belongs in a feed filtered by this query.
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(community) = &self.community {
            if &post.community_id != community {
                return false;
            }
        }
        match self.search_text() {
            Some(text) => post.title.to_lowercase().contains(&text.to_lowercase()),
            None => true,
        }
    }
}

/// Request body for creating a new post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub community_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str, title: &str, up: i64, down: i64, minute: u32) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            content: "body".to_string(),
            community_id: "c1".to_string(),
            community_name: None,
            author_id: None,
            author: None,
            is_anonymous: true,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            upvotes: up,
            downvotes: down,
            my_vote: None,
        }
    }

    #[test]
    fn test_apply_vote_change_flip() {
        let mut p = post("p1", "Mess food", 3, 1, 0);
        p.apply_vote_change(Some(VoteValue::Up), Some(VoteValue::Down));
        assert_eq!((p.upvotes, p.downvotes), (2, 2));
        assert_eq!(p.score(), 0);
        assert_eq!(p.my_vote, Some(VoteValue::Down));
    }

    #[test]
    fn test_projected_score() {
        let p = post("p1", "Mess food", 3, 1, 0);
        assert_eq!(p.projected_score(Some(VoteValue::Up), None), 1);
        assert_eq!(p.projected_score(None, Some(VoteValue::Down)), 1);
    }

    #[test]
    fn test_sort_compare() {
        let old_popular = post("a", "A", 10, 0, 1);
        let new_unpopular = post("b", "B", 0, 2, 5);
        assert_eq!(
            SortMode::New.compare(&new_unpopular, &old_popular),
            Ordering::Less
        );
        assert_eq!(
            SortMode::Top.compare(&old_popular, &new_unpopular),
            Ordering::Less
        );
        assert_eq!(
            SortMode::Hot.compare(&old_popular, &new_unpopular),
            Ordering::Less
        );
    }

    #[test]
    fn test_query_matches_case_insensitive() {
        let query = FeedQuery {
            q: Some("  exam ".to_string()),
            ..FeedQuery::default()
        };
        assert!(query.matches(&post("a", "Mid-term EXAM tips", 0, 0, 0)));
        assert!(!query.matches(&post("b", "Hostel wifi", 0, 0, 0)));
    }

    #[test]
    fn test_query_matches_community() {
        let query = FeedQuery {
            community: Some("c2".to_string()),
            ..FeedQuery::default()
        };
        assert!(!query.matches(&post("a", "Anything", 0, 0, 0)));
    }

    #[test]
    fn test_post_defaults_missing_counters() {
        let raw = serde_json::json!({
            "id": "p1",
            "title": "t",
            "content": "c",
            "communityId": "c1",
            "createdAt": "2024-05-01T12:00:00Z"
        });
        let p: Post = serde_json::from_value(raw).unwrap();
        assert_eq!(p.score(), 0);
        assert!(p.my_vote.is_none());
    }
}

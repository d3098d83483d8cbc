//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{NaiveDate, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::errors::AppError;
use crate::models::{
    format_timestamp, parse_timestamp, AuthorSummary, Comment, Community, CreateCommunityRequest,
    CreatePostRequest, CreateProfileRequest, FeedQuery, MessRating, MessSummary, Post, Profile,
    SortMode, VoteTally, VoteValue, PAGE_SIZE,
};

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.community_id, c.name AS community_name,
           p.author_id, p.is_anonymous, p.created_at, p.upvotes, p.downvotes,
           a.username AS author_username, a.avatar_url AS author_avatar_url,
           v.vote_type AS my_vote
    FROM posts p
    JOIN communities c ON c.id = p.community_id
    LEFT JOIN profiles a ON a.id = p.author_id
    LEFT JOIN post_votes v ON v.post_id = p.id AND v.user_id = ?1
"#;

const COMMENT_SELECT: &str = r#"
    SELECT cm.id, cm.post_id, cm.author_id, cm.content, cm.created_at,
           a.username AS author_username, a.avatar_url AS author_avatar_url,
           CASE WHEN cm.author_id = p.author_id THEN 1 ELSE 0 END AS is_op,
           p.is_anonymous AS post_is_anonymous
    FROM comments cm
    JOIN posts p ON p.id = cm.post_id
    LEFT JOIN profiles a ON a.id = cm.author_id
"#;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    // ==================== PROFILE OPERATIONS ====================

    /// Get a profile by ID.
    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query("SELECT id, username, avatar_url, created_at FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    /// Create a new profile. Usernames are unique.
    pub async fn create_profile(&self, request: &CreateProfileRequest) -> Result<Profile, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let username = request.username.trim();

        sqlx::query("INSERT INTO profiles (id, username, avatar_url, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(username)
            .bind(&request.avatar_url)
            .bind(format_timestamp(&created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation_as_conflict(e, "Username is already taken"))?;

        self.increment_revision().await?;

        Ok(Profile {
            id,
            username: username.to_string(),
            avatar_url: request.avatar_url.clone(),
            created_at,
        })
    }

    // ==================== COMMUNITY OPERATIONS ====================

    /// List all communities ordered by name.
    pub async fn list_communities(&self) -> Result<Vec<Community>, AppError> {
        let rows = sqlx::query("SELECT id, name FROM communities ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(community_from_row).collect())
    }

    /// Get a community by ID.
    pub async fn get_community(&self, id: &str) -> Result<Option<Community>, AppError> {
        let row = sqlx::query("SELECT id, name FROM communities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(community_from_row))
    }

    /// Create a new community. Names are unique.
    pub async fn create_community(
        &self,
        request: &CreateCommunityRequest,
    ) -> Result<Community, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let name = request.name.trim();

        sqlx::query("INSERT INTO communities (id, name) VALUES (?, ?)")
            .bind(&id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation_as_conflict(e, "Community already exists"))?;

        self.increment_revision().await?;

        Ok(Community {
            id,
            name: name.to_string(),
        })
    }

    // ==================== POST OPERATIONS ====================

    /// List posts for a feed query, decorated with the viewer's own vote.
    pub async fn list_posts(
        &self,
        query: &FeedQuery,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, AppError> {
        let order = match query.sort {
            SortMode::New => "p.created_at DESC, p.rowid DESC",
            SortMode::Top | SortMode::Hot => {
                "(p.upvotes - p.downvotes) DESC, p.created_at DESC, p.rowid DESC"
            }
        };
        let sql = format!(
            "{} WHERE (?2 IS NULL OR p.community_id = ?2) \
             AND (?3 IS NULL OR instr(p.title_folded, ?3) > 0) \
             ORDER BY {} LIMIT ?4",
            POST_SELECT, order
        );

        let rows = sqlx::query(&sql)
            .bind(viewer)
            .bind(&query.community)
            .bind(query.search_text().map(str::to_lowercase))
            .bind(PAGE_SIZE)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    /// Get a single post.
    pub async fn get_post(&self, id: &str, viewer: Option<&str>) -> Result<Option<Post>, AppError> {
        let sql = format!("{} WHERE p.id = ?2", POST_SELECT);
        let row = sqlx::query(&sql)
            .bind(viewer)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Create a new post authored by `author_id`.
    pub async fn create_post(
        &self,
        author_id: &str,
        request: &CreatePostRequest,
    ) -> Result<Post, AppError> {
        if self.get_community(&request.community_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Community {} not found",
                request.community_id
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = format_timestamp(&Utc::now());

        sqlx::query(
            "INSERT INTO posts (id, title, title_folded, content, community_id, author_id, is_anonymous, created_at, upvotes, downvotes) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0)"
        )
        .bind(&id)
        .bind(request.title.trim())
        .bind(request.title.trim().to_lowercase())
        .bind(request.content.trim())
        .bind(&request.community_id)
        .bind(author_id)
        .bind(request.is_anonymous as i32)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        self.get_post(&id, Some(author_id))
            .await?
            .ok_or_else(|| AppError::Internal(format!("Post {} vanished after insert", id)))
    }

    // ==================== VOTE OPERATIONS ====================

    /// Insert or replace the viewer's vote and recompute the post's counters.
    pub async fn cast_vote(
        &self,
        post_id: &str,
        user_id: &str,
        value: VoteValue,
    ) -> Result<VoteTally, AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_post_exists(&mut tx, post_id).await?;

        sqlx::query(
            "INSERT INTO post_votes (post_id, user_id, vote_type) VALUES (?, ?, ?) \
             ON CONFLICT(post_id, user_id) DO UPDATE SET vote_type = excluded.vote_type",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(value.weight())
        .execute(&mut *tx)
        .await?;

        let tally = recount_votes(&mut tx, post_id, Some(value)).await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(tally)
    }

    /// Delete the viewer's vote, if any, and recompute the post's counters.
    pub async fn retract_vote(&self, post_id: &str, user_id: &str) -> Result<VoteTally, AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_post_exists(&mut tx, post_id).await?;

        sqlx::query("DELETE FROM post_votes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let tally = recount_votes(&mut tx, post_id, None).await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(tally)
    }

    /// Number of stored vote rows for a post.
    pub async fn count_votes(&self, post_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM post_votes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    // ==================== COMMENT OPERATIONS ====================

    /// List a post's comments in chronological order.
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, AppError> {
        let sql = format!(
            "{} WHERE cm.post_id = ? ORDER BY cm.created_at ASC, cm.rowid ASC",
            COMMENT_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    /// Append a comment to a post.
    pub async fn create_comment(
        &self,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<Comment, AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_post_exists(&mut tx, post_id).await?;

        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(post_id)
        .bind(author_id)
        .bind(content.trim())
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        let sql = format!("{} WHERE cm.id = ?", COMMENT_SELECT);
        let row = sqlx::query(&sql).bind(&id).fetch_one(&self.pool).await?;
        Ok(comment_from_row(&row))
    }

    // ==================== MESS RATING OPERATIONS ====================

    /// Record the user's food rating for `date`. One rating per user per day.
    pub async fn rate_mess(
        &self,
        user_id: &str,
        date: NaiveDate,
        score: i64,
    ) -> Result<MessRating, AppError> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO mess_ratings (id, user_id, rating_date, score) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(date.to_string())
            .bind(score)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation_as_conflict(e, "You already voted today!"))?;

        self.increment_revision().await?;

        Ok(MessRating {
            id,
            user_id: user_id.to_string(),
            rating_date: date,
            score,
        })
    }

    /// Aggregate the ratings for `date`.
    pub async fn mess_summary(&self, date: NaiveDate) -> Result<MessSummary, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count, AVG(score) AS average FROM mess_ratings WHERE rating_date = ?",
        )
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(MessSummary {
            rating_date: date,
            count: row.get("count"),
            average: row.get("average"),
        })
    }
}

// Transaction helpers

async fn ensure_post_exists(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: &str,
) -> Result<(), AppError> {
    let exists = sqlx::query("SELECT 1 FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(&mut **tx)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("Post {} not found", post_id))),
    }
}

/// Recompute a post's counters from its vote rows so score = upvotes - downvotes holds.
async fn recount_votes(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: &str,
    my_vote: Option<VoteValue>,
) -> Result<VoteTally, AppError> {
    sqlx::query(
        r#"UPDATE posts SET
            upvotes = (SELECT COUNT(*) FROM post_votes WHERE post_id = ?1 AND vote_type = 1),
            downvotes = (SELECT COUNT(*) FROM post_votes WHERE post_id = ?1 AND vote_type = -1)
        WHERE id = ?1"#,
    )
    .bind(post_id)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query("SELECT upvotes, downvotes FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok(VoteTally {
        post_id: post_id.to_string(),
        upvotes: row.get("upvotes"),
        downvotes: row.get("downvotes"),
        my_vote,
    })
}

async fn bump_revision(tx: &mut Transaction<'_, Sqlite>) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn unique_violation_as_conflict(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::from(err),
    }
}

// Helper functions for row conversion

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Profile {
    let created_at: String = row.get("created_at");
    Profile {
        id: row.get("id"),
        username: row.get("username"),
        avatar_url: row.get("avatar_url"),
        created_at: parse_timestamp(&created_at),
    }
}

fn community_from_row(row: &sqlx::sqlite::SqliteRow) -> Community {
    Community {
        id: row.get("id"),
        name: row.get("name"),
    }
}

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> Post {
    let is_anonymous: i32 = row.get("is_anonymous");
    let is_anonymous = is_anonymous != 0;
    let created_at: String = row.get("created_at");
    let my_vote: Option<i64> = row.get("my_vote");
    let author = author_from_row(row);

    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        community_id: row.get("community_id"),
        community_name: row.get("community_name"),
        // Anonymous posts never reveal who wrote them.
        author_id: if is_anonymous { None } else { row.get("author_id") },
        author: if is_anonymous { None } else { author },
        is_anonymous,
        created_at: parse_timestamp(&created_at),
        upvotes: row.get("upvotes"),
        downvotes: row.get("downvotes"),
        my_vote: my_vote.and_then(|v| VoteValue::try_from(v).ok()),
    }
}

fn comment_from_row(row: &sqlx::sqlite::SqliteRow) -> Comment {
    let is_op: i32 = row.get("is_op");
    let is_op = is_op != 0;
    let post_is_anonymous: i32 = row.get("post_is_anonymous");
    // The author of an anonymous post stays anonymous in its thread.
    let hidden = is_op && post_is_anonymous != 0;
    let created_at: String = row.get("created_at");
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: if hidden { None } else { row.get("author_id") },
        author: if hidden { None } else { author_from_row(row) },
        content: row.get("content"),
        created_at: parse_timestamp(&created_at),
        is_op,
    }
}

fn author_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<AuthorSummary> {
    let username: Option<String> = row.get("author_username");
    username.map(|username| AuthorSummary {
        username,
        avatar_url: row.get("author_avatar_url"),
    })
}

// Social database - sqlx/SQLite persistence for profiles, posts,
// comments, follow edges, and like membership

use chrono::Utc;
use lru::LruCache;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::num::NonZeroUsize;
use std::str::FromStr;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::models::{
    Comment, CommentView, LikeOutcome, Post, PostId, PostRow, Profile, ProfileId, ProfileSummary,
};

/// Current time in milliseconds since Unix epoch
pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// True when the error is a storage-level uniqueness conflict. Unique
/// constraints are the atomicity mechanism for follow edges and like
/// membership, so several call sites map this to a domain error.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation),
        _ => false,
    }
}

pub struct SocialDatabase {
    pub pool: SqlitePool, // Public for the scheduled publisher's own table access
    profile_cache: Mutex<LruCache<ProfileId, Profile>>,
}

impl SocialDatabase {
    pub async fn new(database_url: &str, cache_capacity: usize) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Configuration(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Ok(SocialDatabase {
            pool,
            profile_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub async fn init(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL,
                username TEXT NOT NULL UNIQUE,
                biography TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                author_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                image_ref TEXT,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Directed follow edges; the unique pair is what makes
        // follow/unfollow a single atomic check-then-mutate step.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS follow_edges (
                actor_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(actor_id, target_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS post_likes (
                post_id INTEGER NOT NULL,
                actor_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(post_id, actor_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Scheduled publication jobs, keyed by the caller-supplied
        // idempotency key. Owned by the ScheduledPublisher.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scheduled_posts (
                job_id TEXT PRIMARY KEY,
                author_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                image_ref TEXT,
                scheduled_time INTEGER NOT NULL,
                idempotency_key TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                post_id INTEGER,
                last_error TEXT,
                next_attempt_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Query-path indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_author_created ON posts(author_id, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_target ON follow_edges(target_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_likes_actor ON post_likes(actor_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_due ON scheduled_posts(status, scheduled_time)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // --- Profiles --------------------------------------------------------

    pub async fn insert_profile(
        &self,
        account_id: i64,
        username: &str,
        biography: &str,
    ) -> AppResult<Profile> {
        let now = current_time_millis();

        let result = sqlx::query(
            "INSERT INTO profiles (account_id, username, biography, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(username)
        .bind(biography)
        .bind(now)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Validation(format!(
                    "Username '{}' is already taken",
                    username
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let profile = Profile {
            id: result.last_insert_rowid(),
            account_id,
            username: username.to_string(),
            biography: biography.to_string(),
            created_at: now,
        };

        self.profile_cache
            .lock()
            .await
            .put(profile.id, profile.clone());

        Ok(profile)
    }

    pub async fn get_profile(&self, id: ProfileId) -> AppResult<Option<Profile>> {
        {
            let mut cache = self.profile_cache.lock().await;
            if let Some(profile) = cache.get(&id).cloned() {
                return Ok(Some(profile));
            }
        }

        let row = sqlx::query(
            "SELECT id, account_id, username, biography, created_at FROM profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let profile = row_to_profile(&row);
            self.profile_cache.lock().await.put(id, profile.clone());
            Ok(Some(profile))
        } else {
            Ok(None)
        }
    }

    pub async fn update_profile(
        &self,
        id: ProfileId,
        username: &str,
        biography: &str,
    ) -> AppResult<Profile> {
        let result = sqlx::query("UPDATE profiles SET username = ?, biography = ? WHERE id = ?")
            .bind(username)
            .bind(biography)
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(r) if r.rows_affected() == 0 => {
                return Err(AppError::NotFound(format!("profile {}", id)));
            }
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Validation(format!(
                    "Username '{}' is already taken",
                    username
                )));
            }
            Err(e) => return Err(e.into()),
        }

        // Drop the stale cache entry; the next read repopulates it.
        self.profile_cache.lock().await.pop(&id);

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", id)))
    }

    pub async fn list_profiles(&self) -> AppResult<Vec<ProfileSummary>> {
        let rows = sqlx::query(
            "SELECT p.id, p.username, p.biography,
                (SELECT COUNT(*) FROM follow_edges e WHERE e.target_id = p.id) AS followers,
                (SELECT COUNT(*) FROM follow_edges e WHERE e.actor_id = p.id) AS following
             FROM profiles p
             ORDER BY p.username",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ProfileSummary {
                id: row.get("id"),
                username: row.get("username"),
                biography: row.get("biography"),
                followers: row.get("followers"),
                following: row.get("following"),
            })
            .collect())
    }

    /// Usernames of profiles following `id`, via a scan on the edge
    /// table's target column.
    pub async fn follower_usernames(&self, id: ProfileId) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT pr.username FROM follow_edges e
             JOIN profiles pr ON pr.id = e.actor_id
             WHERE e.target_id = ?
             ORDER BY pr.username",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("username")).collect())
    }

    pub async fn following_usernames(&self, id: ProfileId) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT pr.username FROM follow_edges e
             JOIN profiles pr ON pr.id = e.target_id
             WHERE e.actor_id = ?
             ORDER BY pr.username",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("username")).collect())
    }

    // --- Follow edges ----------------------------------------------------

    /// Insert a follow edge. Returns false when the edge already exists;
    /// the unique constraint makes concurrent duplicate inserts lose
    /// rather than double-register.
    pub async fn insert_follow_edge(
        &self,
        actor: ProfileId,
        target: ProfileId,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO follow_edges (actor_id, target_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(actor)
        .bind(target)
        .bind(current_time_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a follow edge. Returns false when no edge was present.
    pub async fn delete_follow_edge(
        &self,
        actor: ProfileId,
        target: ProfileId,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follow_edges WHERE actor_id = ? AND target_id = ?")
            .bind(actor)
            .bind(target)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn edge_exists(&self, actor: ProfileId, target: ProfileId) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM follow_edges WHERE actor_id = ? AND target_id = ?) AS present",
        )
        .bind(actor)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;

        let present: i64 = row.get("present");
        Ok(present != 0)
    }

    pub async fn following_ids(&self, actor: ProfileId) -> AppResult<Vec<ProfileId>> {
        let rows = sqlx::query("SELECT target_id FROM follow_edges WHERE actor_id = ?")
            .bind(actor)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("target_id")).collect())
    }

    pub async fn follower_ids(&self, target: ProfileId) -> AppResult<Vec<ProfileId>> {
        let rows = sqlx::query("SELECT actor_id FROM follow_edges WHERE target_id = ?")
            .bind(target)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("actor_id")).collect())
    }

    // --- Posts -----------------------------------------------------------

    pub async fn insert_post(
        &self,
        author_id: ProfileId,
        content: &str,
        image_ref: Option<&str>,
        created_at: i64,
    ) -> AppResult<Post> {
        let result = sqlx::query(
            "INSERT INTO posts (author_id, content, image_ref, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(author_id)
        .bind(content)
        .bind(image_ref)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid(),
            author_id,
            content: content.to_string(),
            image_ref: image_ref.map(|s| s.to_string()),
            created_at,
        })
    }

    pub async fn get_post(&self, id: PostId) -> AppResult<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, author_id, content, image_ref, created_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row_to_post(&row)))
    }

    /// One post with joined author username and engagement counts.
    pub async fn post_row(&self, id: PostId) -> AppResult<Option<PostRow>> {
        let row = sqlx::query(&format!("{} WHERE p.id = ?", POST_ROW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row_to_post_row(&row)))
    }

    /// Posts visible to `viewer`: authored by the viewer or by a profile
    /// the viewer follows. Ordered newest first, ties broken by id so
    /// repeated reads are stable.
    pub async fn visible_posts(&self, viewer: ProfileId) -> AppResult<Vec<PostRow>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.author_id = ?
                OR p.author_id IN (SELECT target_id FROM follow_edges WHERE actor_id = ?)
             ORDER BY p.created_at DESC, p.id DESC",
            POST_ROW_SELECT
        ))
        .bind(viewer)
        .bind(viewer)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_post_row).collect())
    }

    /// Posts the viewer has liked, regardless of current follow state.
    pub async fn liked_posts(&self, viewer: ProfileId) -> AppResult<Vec<PostRow>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.id IN (SELECT post_id FROM post_likes WHERE actor_id = ?)
             ORDER BY p.created_at DESC, p.id DESC",
            POST_ROW_SELECT
        ))
        .bind(viewer)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_post_row).collect())
    }

    pub async fn update_post_image(&self, id: PostId, image_ref: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE posts SET image_ref = ? WHERE id = ?")
            .bind(image_ref)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("post {}", id)));
        }

        Ok(())
    }

    /// Delete a post together with its comments and like rows.
    pub async fn delete_post_cascade(&self, id: PostId) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM post_likes WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // --- Likes -----------------------------------------------------------

    /// Flip like membership for (post, actor) and return the resulting
    /// state. The transaction makes the read-then-write a single step;
    /// two concurrent toggles net exactly one flip each.
    pub async fn toggle_like(&self, post_id: PostId, actor: ProfileId) -> AppResult<LikeOutcome> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND actor_id = ?")
            .bind(post_id)
            .bind(actor)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let liked = if deleted == 0 {
            sqlx::query("INSERT INTO post_likes (post_id, actor_id, created_at) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(actor)
                .bind(current_time_millis())
                .execute(&mut *tx)
                .await?;
            true
        } else {
            false
        };

        let row = sqlx::query("SELECT COUNT(*) AS n FROM post_likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;
        let like_count: i64 = row.get("n");

        tx.commit().await?;

        Ok(LikeOutcome { liked, like_count })
    }

    // --- Comments --------------------------------------------------------

    pub async fn insert_comment(
        &self,
        post_id: PostId,
        author_id: ProfileId,
        content: &str,
    ) -> AppResult<Comment> {
        let now = current_time_millis();

        let result = sqlx::query(
            "INSERT INTO comments (post_id, author_id, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(content)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id,
            author_id,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Comments for a post, newest first (ties broken by id).
    pub async fn comments_for_post(&self, post_id: PostId) -> AppResult<Vec<CommentView>> {
        let rows = sqlx::query(
            "SELECT c.id, pr.username AS author, c.content, c.created_at
             FROM comments c
             JOIN profiles pr ON pr.id = c.author_id
             WHERE c.post_id = ?
             ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CommentView {
                id: row.get("id"),
                author: row.get("author"),
                content: row.get("content"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

const POST_ROW_SELECT: &str = "SELECT p.id, p.author_id, p.content, p.image_ref, p.created_at,
        pr.username AS author,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
        (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count
     FROM posts p
     JOIN profiles pr ON pr.id = p.author_id";

fn row_to_profile(row: &SqliteRow) -> Profile {
    Profile {
        id: row.get("id"),
        account_id: row.get("account_id"),
        username: row.get("username"),
        biography: row.get("biography"),
        created_at: row.get("created_at"),
    }
}

fn row_to_post(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        author_id: row.get("author_id"),
        content: row.get("content"),
        image_ref: row.get("image_ref"),
        created_at: row.get("created_at"),
    }
}

fn row_to_post_row(row: &SqliteRow) -> PostRow {
    PostRow {
        post: row_to_post(row),
        author: row.get("author"),
        comment_count: row.get("comment_count"),
        like_count: row.get("like_count"),
    }
}

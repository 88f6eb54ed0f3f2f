// Domain models - profiles, posts, comments, and their response projections

use serde::{Deserialize, Serialize};

/// Profile identifier
pub type ProfileId = i64;

/// Post identifier
pub type PostId = i64;

/// Comment identifier
pub type CommentId = i64;

/// A user's social identity, distinct from the authentication account.
/// The follow-edge set lives in its own table and is mutated only
/// through the social graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub account_id: i64,
    pub username: String,
    pub biography: String,
    pub created_at: i64,
}

/// A published post. `created_at` is fixed at materialization and never
/// changes afterwards, including for posts created by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: ProfileId,
    pub content: String,
    pub image_ref: Option<String>,
    pub created_at: i64,
}

/// Append-only comment on a post. Deleted only when the parent post is
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: ProfileId,
    pub content: String,
    pub created_at: i64,
}

/// Optional narrowing filters for a feed query. `author` matches the
/// author's username, `title` matches post content; both are
/// case-insensitive substring matches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedFilter {
    pub author: Option<String>,
    pub title: Option<String>,
}

/// Result of a like toggle: the state after the call and the new count.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
}

/// Raw feed row fetched from storage: the post plus the joined author
/// username and engagement counts. Projected to `PostSummary` or
/// `PostDetail` at the boundary.
#[derive(Debug, Clone)]
pub struct PostRow {
    pub post: Post,
    pub author: String,
    pub comment_count: i64,
    pub like_count: i64,
}

// --- Response projections ------------------------------------------------
// Plain functions from domain entities to response shapes; list and
// detail variants mirror what each endpoint returns.

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub id: ProfileId,
    pub username: String,
    pub biography: String,
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileDetail {
    pub id: ProfileId,
    pub username: String,
    pub biography: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub id: PostId,
    pub author: String,
    pub content: String,
    pub image_ref: Option<String>,
    pub created_at: i64,
    pub comments: i64,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: PostId,
    pub author: String,
    pub content: String,
    pub image_ref: Option<String>,
    pub created_at: i64,
    pub likes: i64,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub author: String,
    pub content: String,
    pub created_at: i64,
}

impl PostSummary {
    pub fn project(row: &PostRow) -> Self {
        PostSummary {
            id: row.post.id,
            author: row.author.clone(),
            content: row.post.content.clone(),
            image_ref: row.post.image_ref.clone(),
            created_at: row.post.created_at,
            comments: row.comment_count,
            likes: row.like_count,
        }
    }
}

impl PostDetail {
    pub fn project(row: &PostRow, comments: Vec<CommentView>) -> Self {
        PostDetail {
            id: row.post.id,
            author: row.author.clone(),
            content: row.post.content.clone(),
            image_ref: row.post.image_ref.clone(),
            created_at: row.post.created_at,
            likes: row.like_count,
            comments,
        }
    }
}

// Feed engine - visibility-scoped, filtered, ordered post views

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::database::SocialDatabase;
use crate::error::{AppError, AppResult};
use crate::models::{FeedFilter, PostId, PostSummary, ProfileId};

/// Builds post views restricted to the viewer's visibility set: the
/// viewer itself plus every profile it follows.
#[derive(Clone)]
pub struct FeedEngine {
    db: Arc<SocialDatabase>,
}

impl FeedEngine {
    pub fn new(db: Arc<SocialDatabase>) -> Self {
        Self { db }
    }

    /// The viewer's feed, narrowed by the optional filters and ordered
    /// newest first (ties broken by id descending). A viewer with no
    /// followees and no posts gets an empty result, not an error.
    #[instrument(skip(self, filter))]
    pub async fn feed(&self, viewer: ProfileId, filter: &FeedFilter) -> AppResult<Vec<PostSummary>> {
        self.ensure_profile(viewer).await?;

        let rows = self.db.visible_posts(viewer).await?;

        let mut seen: HashSet<PostId> = HashSet::new();
        let posts: Vec<PostSummary> = rows
            .iter()
            .filter(|row| seen.insert(row.post.id))
            .filter(|row| {
                matches_filter(&filter.author, &row.author)
                    && matches_filter(&filter.title, &row.post.content)
            })
            .map(PostSummary::project)
            .collect();

        debug!(
            "Feed for profile {}: {} of {} visible posts after filters",
            viewer,
            posts.len(),
            rows.len()
        );
        Ok(posts)
    }

    /// Posts the viewer has liked, same ordering as the feed. Not
    /// restricted by the visibility set: likes remain queryable after an
    /// unfollow.
    #[instrument(skip(self))]
    pub async fn liked_posts(&self, viewer: ProfileId) -> AppResult<Vec<PostSummary>> {
        self.ensure_profile(viewer).await?;

        let rows = self.db.liked_posts(viewer).await?;
        Ok(rows.iter().map(PostSummary::project).collect())
    }

    async fn ensure_profile(&self, id: ProfileId) -> AppResult<()> {
        self.db
            .get_profile(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("profile {}", id)))
    }
}

/// Case-insensitive substring match; an absent or empty filter matches
/// everything.
fn matches_filter(filter: &Option<String>, value: &str) -> bool {
    match filter {
        Some(needle) if !needle.is_empty() => {
            value.to_lowercase().contains(&needle.to_lowercase())
        }
        _ => true,
    }
}

// Engagement - like toggling and comment appends on posts

use std::sync::Arc;
use tracing::{info, instrument};

use crate::database::SocialDatabase;
use crate::error::{AppError, AppResult};
use crate::models::{Comment, LikeOutcome, PostId, ProfileId};

#[derive(Clone)]
pub struct EngagementStore {
    db: Arc<SocialDatabase>,
}

impl EngagementStore {
    pub fn new(db: Arc<SocialDatabase>) -> Self {
        Self { db }
    }

    /// Flip like membership for (post, actor): a like if absent, an
    /// unlike if present. Exactly one state change per call; the flip
    /// runs as a single transaction so concurrent toggles from the same
    /// actor cannot both register as likes.
    #[instrument(skip(self))]
    pub async fn toggle_like(&self, actor: ProfileId, post_id: PostId) -> AppResult<LikeOutcome> {
        self.ensure_profile(actor).await?;
        self.ensure_post(post_id).await?;

        let outcome = self.db.toggle_like(post_id, actor).await?;

        info!(
            "Profile {} {} post {} (likes: {})",
            actor,
            if outcome.liked { "liked" } else { "unliked" },
            post_id,
            outcome.like_count
        );
        Ok(outcome)
    }

    /// Append a comment to a post. Content must be non-empty after
    /// trimming. A plain append with a server-assigned id and timestamp;
    /// needs no coordination under concurrency.
    #[instrument(skip(self, content))]
    pub async fn add_comment(
        &self,
        actor: ProfileId,
        post_id: PostId,
        content: &str,
    ) -> AppResult<Comment> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(AppError::EmptyComment);
        }

        self.ensure_profile(actor).await?;
        self.ensure_post(post_id).await?;

        let comment = self.db.insert_comment(post_id, actor, trimmed).await?;

        info!(
            "Profile {} commented on post {} (comment {})",
            actor, post_id, comment.id
        );
        Ok(comment)
    }

    async fn ensure_profile(&self, id: ProfileId) -> AppResult<()> {
        self.db
            .get_profile(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("profile {}", id)))
    }

    async fn ensure_post(&self, id: PostId) -> AppResult<()> {
        self.db
            .get_post(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("post {}", id)))
    }
}

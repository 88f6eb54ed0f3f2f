// Social graph - directed follow edges and their consistency rules

use std::sync::Arc;
use tracing::{info, instrument};

use crate::database::SocialDatabase;
use crate::error::{AppError, AppResult};
use crate::models::ProfileId;

/// Enforces follow/unfollow invariants over the follow-edge set. Edge
/// mutations are atomic check-then-mutate steps backed by the storage
/// uniqueness constraint on (actor, target).
#[derive(Clone)]
pub struct SocialGraph {
    db: Arc<SocialDatabase>,
}

impl SocialGraph {
    pub fn new(db: Arc<SocialDatabase>) -> Self {
        Self { db }
    }

    /// Add a follow edge from `actor` to `target`.
    ///
    /// A repeated follow is an explicit `AlreadyFollowing` error rather
    /// than a silent no-op, so callers can tell "new follow" from
    /// "nothing changed". Self-follows are rejected here, at the
    /// mutation boundary, not in storage.
    #[instrument(skip(self))]
    pub async fn follow(&self, actor: ProfileId, target: ProfileId) -> AppResult<()> {
        if actor == target {
            return Err(AppError::SelfFollow);
        }

        self.ensure_profile(actor).await?;
        self.ensure_profile(target).await?;

        if !self.db.insert_follow_edge(actor, target).await? {
            return Err(AppError::AlreadyFollowing);
        }

        info!("Profile {} now follows {}", actor, target);
        Ok(())
    }

    /// Remove the follow edge from `actor` to `target`. Unfollowing a
    /// profile that was never followed is a `NotFollowing` error.
    #[instrument(skip(self))]
    pub async fn unfollow(&self, actor: ProfileId, target: ProfileId) -> AppResult<()> {
        self.ensure_profile(actor).await?;
        self.ensure_profile(target).await?;

        if !self.db.delete_follow_edge(actor, target).await? {
            return Err(AppError::NotFollowing);
        }

        info!("Profile {} unfollowed {}", actor, target);
        Ok(())
    }

    /// Pure membership query, no side effects.
    pub async fn is_following(&self, actor: ProfileId, target: ProfileId) -> AppResult<bool> {
        self.db.edge_exists(actor, target).await
    }

    /// Profiles `actor` follows.
    pub async fn following(&self, actor: ProfileId) -> AppResult<Vec<ProfileId>> {
        self.db.following_ids(actor).await
    }

    /// Profiles following `target` (reverse lookup over the edge table).
    pub async fn followers(&self, target: ProfileId) -> AppResult<Vec<ProfileId>> {
        self.db.follower_ids(target).await
    }

    async fn ensure_profile(&self, id: ProfileId) -> AppResult<()> {
        self.db
            .get_profile(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("profile {}", id)))
    }
}

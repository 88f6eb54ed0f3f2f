// Profile store - identity CRUD and profile listings

use std::sync::Arc;
use tracing::{info, instrument};

use crate::database::SocialDatabase;
use crate::error::{AppError, AppResult};
use crate::models::{Profile, ProfileDetail, ProfileId, ProfileSummary};

#[derive(Clone)]
pub struct ProfileStore {
    db: Arc<SocialDatabase>,
}

impl ProfileStore {
    pub fn new(db: Arc<SocialDatabase>) -> Self {
        Self { db }
    }

    /// Create a profile for an externally managed account. Username must
    /// be non-empty and unique.
    #[instrument(skip(self, biography))]
    pub async fn create_profile(
        &self,
        account_id: i64,
        username: &str,
        biography: &str,
    ) -> AppResult<Profile> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::Validation(
                "Username must not be empty".to_string(),
            ));
        }

        let profile = self.db.insert_profile(account_id, username, biography).await?;
        info!("Created profile {} ('{}')", profile.id, profile.username);
        Ok(profile)
    }

    pub async fn get_profile(&self, id: ProfileId) -> AppResult<Profile> {
        self.db
            .get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", id)))
    }

    /// Detail projection with follower and following username lists.
    pub async fn get_detail(&self, id: ProfileId) -> AppResult<ProfileDetail> {
        let profile = self.get_profile(id).await?;
        let followers = self.db.follower_usernames(id).await?;
        let following = self.db.following_usernames(id).await?;

        Ok(ProfileDetail {
            id: profile.id,
            username: profile.username,
            biography: profile.biography,
            followers,
            following,
        })
    }

    /// All profiles with follower/following counts, optionally narrowed
    /// by a case-insensitive username substring filter.
    pub async fn list_profiles(&self, username: Option<&str>) -> AppResult<Vec<ProfileSummary>> {
        let profiles = self.db.list_profiles().await?;

        Ok(match username {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                profiles
                    .into_iter()
                    .filter(|p| p.username.to_lowercase().contains(&needle))
                    .collect()
            }
            _ => profiles,
        })
    }

    /// Update username/biography. Only the owning profile may mutate
    /// itself; follow edges are out of reach here by design.
    #[instrument(skip(self, username, biography))]
    pub async fn update_profile(
        &self,
        actor: ProfileId,
        id: ProfileId,
        username: Option<&str>,
        biography: Option<&str>,
    ) -> AppResult<Profile> {
        let current = self.get_profile(id).await?;
        if actor != id {
            return Err(AppError::PermissionDenied);
        }

        let username = match username {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(AppError::Validation(
                        "Username must not be empty".to_string(),
                    ));
                }
                name.to_string()
            }
            None => current.username,
        };
        let biography = biography
            .map(|b| b.to_string())
            .unwrap_or(current.biography);

        let updated = self.db.update_profile(id, &username, &biography).await?;
        info!("Profile {} updated", id);
        Ok(updated)
    }
}
